use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use apache_rewrite::{Tester, preprocess};
use clap::Parser;
use serde_json::json;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::core::{
    cli::Cli,
    configuration::{self, BoxError, Configuration, RequestCase, ServerConfiguration},
    report::Report,
};

/// boot up the application kernel
/// ``` rust,ignore
/// let krn = kernel::boot().await?;
/// let code = krn.run().await?;
/// ```
pub async fn boot() -> Result<Kernel, BoxError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let conf = match &cli.configuration_path {
        Some(path) => configuration::load_configuration(path).await?,
        None => Configuration::default(),
    };
    Kernel::new(cli, conf)
}

/// Install the log subscriber, `--verbose` overrides `RUST_LOG`.
fn init_tracing(verbose: bool) {
    let filter = match verbose {
        true => EnvFilter::new("debug"),
        false => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {err}");
    }
}

/// The application kernel, owns the resolved test plan and runs it.
#[derive(Debug)]
pub struct Kernel {
    apache_config: PathBuf,
    server: ServerConfiguration,
    maps: BTreeMap<String, BTreeMap<String, String>>,
    max_iterations: Option<usize>,
    cases: Vec<RequestCase>,
    json: bool,
}

impl Kernel {
    /// Merge command line overrides into the loaded plan.
    pub fn new(cli: Cli, configuration: Configuration) -> Result<Self, BoxError> {
        let plan_dir = cli
            .configuration_path
            .as_deref()
            .and_then(|path| Path::new(path).parent())
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let apache_config = match (cli.config, configuration.apache) {
            (Some(path), _) => PathBuf::from(path),
            (None, Some(apache)) => plan_dir.join(apache.config),
            (None, None) => {
                return Err("no apache configuration given, pass --config or a test plan".into());
            }
        };

        let mut server = configuration.server.unwrap_or_default();
        if let Some(ip) = cli.ip {
            server.ip = Some(ip);
        }
        if let Some(port) = cli.port {
            server.port = Some(port);
        }

        let cases = match cli.uri {
            Some(uri) => vec![RequestCase {
                name: None,
                method: Some(cli.method),
                uri,
                host: Some(cli.host),
                headers: cli.headers.into_iter().collect(),
                expect: None,
            }],
            None => configuration.requests,
        };
        if cases.is_empty() {
            return Err("nothing to evaluate, pass --uri or list requests in the plan".into());
        }

        Ok(Self {
            apache_config,
            server,
            maps: configuration.maps,
            max_iterations: configuration.max_iterations,
            cases,
            json: cli.json,
        })
    }

    /// Evaluate every case and print the results.
    ///
    /// Fails when any case errors or misses its expectation.
    pub async fn run(self) -> Result<ExitCode, BoxError> {
        let tester = self.load_tester().await?;
        let reports: Vec<Report> = self
            .cases
            .iter()
            .map(|case| Report::new(case, tester.evaluate(&case.to_request())))
            .collect();
        let failed = reports.iter().filter(|report| !report.passed()).count();
        let passed = reports.len() - failed;

        if self.json {
            let output = json!({
                "config": self.apache_config.display().to_string(),
                "passed": passed,
                "failed": failed,
                "results": reports,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            for report in &reports {
                println!("{report}");
            }
            println!("\n{passed} passed, {failed} failed");
        }

        Ok(match failed {
            0 => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        })
    }

    async fn load_tester(&self) -> Result<Tester, BoxError> {
        let path = self.apache_config.clone();
        let text = tokio::task::spawn_blocking(move || read_apache_config(&path)).await??;

        let mut tester = Tester::from_str(&text)?.server(self.server.to_server());
        for (name, entries) in &self.maps {
            tester = tester.map(name, entries.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        if let Some(iterations) = self.max_iterations {
            tester = tester.max_iterations(iterations);
        }
        tracing::debug!(
            path = %self.apache_config.display(),
            hosts = tester.main_context().virtual_hosts().len(),
            "loaded apache configuration"
        );
        Ok(tester)
    }
}

/// Read an httpd configuration, resolving includes relative to its
/// directory and joining continued lines.
fn read_apache_config(path: &Path) -> Result<String, BoxError> {
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let text = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    let text = preprocess::expand_includes(&text, |include| {
        std::fs::read_to_string(base.join(include)).ok()
    })?;
    Ok(preprocess::join_continued_lines(&text)?)
}
