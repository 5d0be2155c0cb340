use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::recognition::{self, ModelArgs, ServeCliArgs, ServeConfig};

#[derive(Parser)]
#[command(
    name = "gesture-server",
    version,
    about = "Recognise hand gestures from a camera and serve them over HTTP"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MJPEG stream and prediction endpoints.
    Serve(ServeCliArgs),
    /// Load the classifier, labels, and landmark model, then exit.
    CheckModels(ModelArgs),
}

pub fn handle_commands(args: &[String]) -> Result<()> {
    match Cli::parse_from(args).command {
        Command::Serve(args) => recognition::run(ServeConfig::try_from(args)?),
        Command::CheckModels(args) => recognition::check_models(args),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_both_subcommands() {
        let cli = Cli::try_parse_from(["gesture-server", "serve", "--port", "8080"]).unwrap();
        assert!(matches!(cli.command, Command::Serve(ref args) if args.port == 8080));

        let cli = Cli::try_parse_from(["gesture-server", "check-models", "--labels", "l.json"])
            .unwrap();
        assert!(matches!(cli.command, Command::CheckModels(_)));
    }
}
