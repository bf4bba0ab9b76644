use anyhow::bail;
use clap::Parser;

/// Runtime configuration for the `factorbench-server` binary.
///
/// Values are parsed from CLI arguments or environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "factorbench-server",
    version,
    about = "An instrumented HTTP service answering factorization requests"
)]
pub struct CliArgs {
    /// Interface to bind.
    ///
    /// Environment variable: `HOST`
    #[arg(long, env = "HOST", default_value_t = String::from("0.0.0.0"))]
    pub host: String,

    /// Port to listen on.
    ///
    /// Environment variable: `PORT`
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let host = args.host.trim();
        if host.is_empty() {
            bail!("HOST must not be empty");
        }

        Ok(Self {
            listen_addr: format!("{host}:{}", args.port),
        })
    }
}
