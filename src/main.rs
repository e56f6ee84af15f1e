use chat_moderation::config::{generate_default_config, load_config, ModerationConfig};
use chat_moderation::machine_learning::{LexiconModelLoader, ModelLoader};
use chat_moderation::moderator::{ChatKind, ContentModerator};
use chat_moderation::regression;
use clap::{Arg, Command};
use log::LevelFilter;
use std::path::Path;
use std::process;

#[tokio::main]
async fn main() {
    let matches = Command::new("chat-moderation")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Layered chat message moderation: rule-based checks plus a local toxicity classifier")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/chat-moderation.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Test configuration validity and model availability")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("message")
                .long("message")
                .value_name("TEXT")
                .help("Moderate a single message and print the decision as JSON")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("examples")
                .long("examples")
                .value_name("FILE")
                .help("Run the EXPECTED|MESSAGE regression examples in FILE")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("submitter")
                .long("submitter")
                .value_name("ID")
                .help("Submitter id used for repetition checks with --message")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("chat-kind")
                .long("chat-kind")
                .value_name("KIND")
                .help("Chat kind for --message (city or private)")
                .default_value("city"),
        )
        .arg(
            Arg::new("quick")
                .long("quick")
                .help("Use rule-based checks only with --message")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging with per-detector results")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        match generate_default_config(generate_path) {
            Ok(()) => {
                println!("Default configuration written to: {generate_path}");
                println!("Please edit the configuration file to suit your needs.");
            }
            Err(e) => {
                eprintln!("Error writing configuration file: {e:#}");
                process::exit(1);
            }
        }
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/chat-moderation.yaml");
    let config_exists = Path::new(config_path).exists();
    let config = if config_exists {
        match load_config(config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading configuration: {e:#}");
                process::exit(1);
            }
        }
    } else {
        ModerationConfig::default()
    };

    // Initialize logger based on verbose flag, then the configured level
    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        config
            .logging
            .level
            .parse::<LevelFilter>()
            .unwrap_or(LevelFilter::Info)
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if !config_exists {
        log::warn!("Configuration file '{config_path}' not found, using default configuration");
    }

    if matches.get_flag("test-config") {
        test_config(&config).await;
        return;
    }

    let moderator = ContentModerator::new(&config);

    if let Some(examples_file) = matches.get_one::<String>("examples") {
        run_examples(&moderator, examples_file).await;
        return;
    }

    if let Some(message) = matches.get_one::<String>("message") {
        let chat_kind = match matches
            .get_one::<String>("chat-kind")
            .map(|k| k.parse::<ChatKind>())
            .unwrap_or(Ok(ChatKind::City))
        {
            Ok(kind) => kind,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(2);
            }
        };
        let submitter = matches.get_one::<String>("submitter").map(String::as_str);

        let result = if matches.get_flag("quick") {
            moderator.quick_check(message, submitter)
        } else {
            moderator.moderate(Some(message), submitter, chat_kind).await
        };

        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing decision: {e}");
                process::exit(1);
            }
        }
        process::exit(if result.allowed { 0 } else { 1 });
    }

    eprintln!("Nothing to do: pass --message, --examples, --test-config or --generate-config");
    process::exit(2);
}

async fn test_config(config: &ModerationConfig) {
    println!("🔍 Testing configuration...");
    println!();
    println!(
        "Classifier required for rule blocks: {}",
        config.moderator.require_classifier_for_block
    );
    println!(
        "Classifier timeout: {} ms (inference {} ms)",
        config.moderator.classifier_timeout_ms, config.classifier.inference_timeout_ms
    );
    println!(
        "Repetition window: {} messages / {} s",
        config.repetition.window_capacity, config.repetition.window_ttl_secs
    );

    let loader = LexiconModelLoader::from_config(&config.classifier);
    for path in loader.search_paths() {
        let status = if path.exists() { "found" } else { "missing" };
        println!("  Model path {}: {}", path.display(), status);
    }

    match loader.load().await {
        Ok(model) => println!("✅ Sentiment model '{}' loaded successfully", model.name()),
        Err(e) => {
            println!("❌ Configuration validation failed:");
            println!("Error: {e:#}");
            process::exit(1);
        }
    }
}

async fn run_examples(moderator: &ContentModerator, examples_file: &str) {
    println!("🧪 Content Moderation Test Suite");
    println!("Reading examples from: {examples_file}");
    println!();

    let cases = match regression::load_examples(examples_file) {
        Ok(cases) => cases,
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            eprintln!("💡 Expected one case per line: EXPECTED_RESULT|MESSAGE_TEXT");
            process::exit(1);
        }
    };

    if cases.is_empty() {
        eprintln!("❌ No valid test cases found!");
        process::exit(1);
    }

    println!("Found {} test cases", cases.len());
    println!("{}", "─".repeat(80));

    let report = regression::run_suite(moderator, &cases).await;
    let total = report.total();

    for (i, outcome) in report.outcomes.iter().enumerate() {
        let result = &outcome.result;
        println!();
        println!(
            "[{}/{}] {} | {}",
            i + 1,
            total,
            outcome.case.expected,
            result.decision
        );
        println!("   Message: \"{}\"", truncate_string(&outcome.case.message, 60));
        if !result.flags.is_empty() {
            println!("   Flags: {}", result.flags.join(", "));
        }
        if let Some(reason) = &result.reason {
            println!("   Reason: {reason}");
        }
        if result.sources.ai {
            println!("   AI Confidence: {:.1}%", result.confidence * 100.0);
        }
        if outcome.passed() {
            println!("   ✅ PASS");
        } else {
            println!(
                "   ❌ FAIL - Expected {} but got {} (line {})",
                outcome.case.expected, result.decision, outcome.case.line_number
            );
        }
    }

    println!();
    println!("{}", "─".repeat(80));
    println!("📊 Test Summary");
    println!("   Total:  {total}");
    println!("   Passed: {}", report.passed());
    println!("   Failed: {}", report.failed());
    println!("   Success Rate: {:.1}%", report.success_rate());

    process::exit(if report.failed() > 0 { 1 } else { 0 });
}

fn truncate_string(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}
