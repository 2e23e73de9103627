//! Command-line entrypoint shared by service binaries.
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> omg_micro::Result<()> {
//!     let mut service = omg_micro::Service::from_env("service")?;
//!     // register endpoints...
//!     omg_micro::cli::main(service).await
//! }
//! ```

use clap::{Parser, Subcommand};

use crate::error::Result;
use crate::service::Service;

#[derive(Parser, Debug)]
#[command(version, about = "Serve, describe and package an OMG microservice", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Serve the registered endpoints over HTTP (default)
    Serve,
    /// Write microservice.yml if it does not exist yet
    Manifest {
        /// Print the manifest instead of writing it
        #[arg(long)]
        stdout: bool,
    },
    /// Write the Dockerfile if it does not exist yet
    Dockerfile,
    /// Build the service image with the omg CLI
    Build,
    /// Run an action through the omg CLI
    Run {
        /// Action (endpoint) name
        action: String,
        /// Arguments as key=value pairs
        #[arg(value_parser = parse_key_value)]
        args: Vec<(String, String)>,
    },
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

/// Parses `std::env::args` and executes the command against `service`.
pub async fn main(service: Service) -> Result<()> {
    execute(service, Cli::parse()).await
}

/// Executes an already-parsed command line.
pub async fn execute(service: Service, cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => service.serve().await,
        Command::Manifest { stdout: true } => {
            print!("{}", service.manifest().render()?);
            Ok(())
        }
        Command::Manifest { stdout: false } => {
            report(service.ensure_manifest()?, &service.config().manifest_path);
            Ok(())
        }
        Command::Dockerfile => {
            report(service.ensure_dockerfile()?, &service.config().dockerfile_path);
            Ok(())
        }
        Command::Build => {
            service.build_checked().await?;
            println!("Built {}.", service.name());
            Ok(())
        }
        Command::Run { action, args } => {
            let output = service.run(&action, &args).await?;
            print!("{output}");
            Ok(())
        }
    }
}

fn report(written: bool, path: &std::path::Path) {
    if written {
        println!("Wrote {}.", path.display());
    } else {
        println!("{} already exists; left untouched.", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::handler::{Arguments, HandlerError};
    use crate::registry::Endpoint;

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::try_parse_from(["service"]).unwrap();
        assert_eq!(cli.command, None);

        let cli = Cli::try_parse_from(["service", "serve"]).unwrap();
        assert_eq!(cli.command, Some(Command::Serve));
    }

    #[test]
    fn parses_run_arguments() {
        let cli = Cli::try_parse_from(["service", "run", "work", "prefix=ab", "empty="]).unwrap();
        assert_eq!(
            cli.command,
            Some(Command::Run {
                action: "work".into(),
                args: vec![
                    ("prefix".into(), "ab".into()),
                    ("empty".into(), String::new())
                ],
            })
        );

        assert!(Cli::try_parse_from(["service", "run", "work", "prefix"]).is_err());
        assert!(Cli::try_parse_from(["service", "run", "work", "=ab"]).is_err());
    }

    #[test]
    fn parses_manifest_flags() {
        let cli = Cli::try_parse_from(["service", "manifest", "--stdout"]).unwrap();
        assert_eq!(cli.command, Some(Command::Manifest { stdout: true }));
    }

    #[tokio::test]
    async fn manifest_and_dockerfile_commands_write_files() {
        fn work(_: Arguments) -> std::result::Result<&'static str, HandlerError> {
            Ok("done")
        }

        let tmp = tempfile::tempdir().unwrap();
        let config = ServiceConfig::builder()
            .manifest_path(tmp.path().join("microservice.yml"))
            .dockerfile_path(tmp.path().join("Dockerfile"))
            .disable_tool()
            .build();
        let mut service = Service::new("service", config.clone());
        service.register(Endpoint::builder(work)).unwrap();

        let cli = Cli::try_parse_from(["service", "manifest"]).unwrap();
        execute(service, cli).await.unwrap();
        assert!(config.manifest_path.exists());

        let service = Service::new("service", config.clone());
        let cli = Cli::try_parse_from(["service", "dockerfile"]).unwrap();
        execute(service, cli).await.unwrap();
        assert!(config.dockerfile_path.exists());
    }
}
