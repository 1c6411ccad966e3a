use std::process::ExitCode;

mod core;
mod kernel;

#[tokio::main]
async fn main() -> ExitCode {
    let result = match kernel::boot().await {
        Ok(krn) => krn.run().await,
        Err(err) => Err(err),
    };

    result.unwrap_or_else(|err| {
        eprintln!("error: {err}");
        ExitCode::from(2)
    })
}
