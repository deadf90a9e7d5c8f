use authscope_core::{AuthExplorer, DetectionOutcome, OllamaNarrator};
use authscope_scanner::renderer::{ChromeRenderer, HttpRenderer, PageRenderer};
use clap::ArgMatches;
use colored::Colorize;
use commands::command_argument_builder;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

mod commands;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

fn print_banner() {
    println!("{}", "authscope".bright_cyan().bold());
    println!("{}", "auth component discovery for the messy web".dimmed());
    println!();
}

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    if !quiet {
        print_banner();
    }

    match chosen_command.subcommand() {
        Some(("analyze", primary_command)) => handle_analyze(primary_command, quiet).await,
        None => {}
        _ => unreachable!("clap should ensure we don't get here"),
    }
}

async fn handle_analyze(args: &ArgMatches, quiet: bool) {
    let url = args.get_one::<Url>("url").expect("url is required");
    let interactive = args.get_flag("interactive");
    let static_only = args.get_flag("static-only");
    let max_depth = *args.get_one::<usize>("max-depth").expect("has default");
    let timeout = *args.get_one::<u64>("timeout").expect("has default");
    let model = args.get_one::<String>("model").expect("has default");
    let ollama_url = args.get_one::<String>("ollama-url").expect("has default");
    let as_json = args.get_flag("json");

    let renderer: Arc<dyn PageRenderer> = if static_only {
        Arc::new(HttpRenderer::with_timeout(timeout))
    } else {
        Arc::new(ChromeRenderer::with_timeout(timeout))
    };
    let narrator = Arc::new(OllamaNarrator::with_endpoint(ollama_url, model));

    let explorer = AuthExplorer::new(renderer, narrator).with_max_depth(max_depth);

    let spinner = if !quiet && !as_json {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Analyzing {url}..."));
        Some(pb)
    } else {
        None
    };

    let outcome = explorer.analyze(url.as_str(), interactive).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    if as_json {
        match serde_json::to_string_pretty(&outcome) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize outcome: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    print_outcome(&outcome);

    if !outcome.found {
        std::process::exit(1);
    }
}

fn print_outcome(outcome: &DetectionOutcome) {
    let divider = "═".repeat(60);
    println!("{}", divider.bright_blue().bold());
    println!(
        "{} {}",
        "URL:".bright_cyan().bold(),
        outcome.url.as_str().bright_white()
    );
    println!(
        "{} {}",
        "Analyzed:".bright_cyan().bold(),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "{} {:?}",
        "Strategy:".bright_cyan().bold(),
        outcome.method
    );

    if outcome.captcha_detected {
        println!(
            "{}",
            "⚠ Blocked by anti-bot protection".bright_yellow().bold()
        );
    }

    if let Some(ref error) = outcome.error {
        println!("{} {}", "Error:".bright_red().bold(), error);
    }

    println!("{}", divider.bright_blue().bold());

    if outcome.found {
        println!(
            "{} {} component(s) detected",
            "✓".bright_green().bold(),
            outcome.components.len()
        );
        for (i, component) in outcome.components.iter().enumerate() {
            println!();
            println!(
                "{} {:?} {} {:?}",
                format!("[{}]", i + 1).bright_green().bold(),
                component.kind,
                "via".dimmed(),
                component.detection_method
            );
            println!("    {} {}", "source:".dimmed(), component.source_url);
            let preview: String = component.html_fragment.chars().take(200).collect();
            println!("    {}", preview.dimmed());
        }
    } else {
        println!("{} No auth components found", "✗".bright_red().bold());
    }

    if !outcome.narrative.is_empty() {
        println!();
        println!("{}", "Analysis".bright_cyan().bold());
        println!("{}", outcome.narrative);
    }
}
