use clap::{Parser, command};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Test plan in yaml or toml
    #[arg(short, long)]
    pub configuration_path: Option<String>,

    /// Apache configuration file, overrides the one named by the plan
    #[arg(long)]
    pub config: Option<String>,

    /// Evaluate a single request instead of the plan's cases
    #[arg(long)]
    pub uri: Option<String>,

    #[arg(long, default_value = "localhost")]
    pub host: String,

    #[arg(long, default_value = "GET")]
    pub method: String,

    /// Extra request header as `Name:value`, may be repeated
    #[arg(long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Address the request arrives on
    #[arg(long)]
    pub ip: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Print results as json
    #[arg(long)]
    pub json: bool,

    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("invalid header {s:?}, expected Name:value"))?;
    match name.trim() {
        "" => Err(format!("invalid header {s:?}, empty name")),
        name => Ok((name.to_owned(), value.trim().to_owned())),
    }
}
