use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("authscope")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("authscope")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("analyze")
                .about(
                    "Analyze a URL for authentication UI components. Falls back through \
                    increasingly expensive detection strategies until something is found.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The URL to analyze")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-i --"interactive")
                        .required(false)
                        .help(
                            "Enable interactive browser mode: render with a headless browser, \
                            simulate login-affordance clicks and probe conventional auth paths",
                        )
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"static-only")
                        .required(false)
                        .help("Never launch a browser; rely on plain HTTP fetches")
                        .action(clap::ArgAction::SetTrue)
                        .conflicts_with("interactive"),
                )
                .arg(
                    arg!(-d --"max-depth" <DEPTH>)
                        .required(false)
                        .help("Maximum recursion depth when following suggested links")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("2"),
                )
                .arg(
                    arg!(-t --"timeout" <SECONDS>)
                        .required(false)
                        .help("HTTP fetch timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"model" <NAME>)
                        .required(false)
                        .help("Ollama model used for narration and link suggestions")
                        .default_value("llama3.2:latest"),
                )
                .arg(
                    arg!(--"ollama-url" <URL>)
                        .required(false)
                        .help("Base URL of the Ollama API")
                        .default_value("http://localhost:11434"),
                )
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Emit the raw outcome as JSON instead of formatted output")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}
