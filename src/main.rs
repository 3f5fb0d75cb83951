use anyhow::{Context, Result};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

use simpair::annotations::parse_label;
use simpair::config::Config;
use simpair::db::Image;
use simpair::labeler::Labeler;
use simpair::logging;

enum Command {
    Scan(PathBuf),
    Next {
        dir: PathBuf,
        budget: Option<Duration>,
    },
    Annotate {
        a: i64,
        b: i64,
        is_similar: bool,
        wait: bool,
    },
    Resolve(i64),
    Retrain,
    Stats,
}

struct Cli {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut budget = None;
    let mut wait = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("simpair {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    fail("--config requires a path argument");
                }
            }
            "--budget-ms" => {
                match args.get(i + 1).and_then(|v| v.parse::<u64>().ok()) {
                    Some(ms) => budget = Some(Duration::from_millis(ms)),
                    None => fail("--budget-ms requires a number of milliseconds"),
                }
                i += 1;
            }
            "--wait" => wait = true,
            arg if arg.starts_with('-') && arg.parse::<i64>().is_err() => {
                fail(&format!("Unknown argument: {}", arg));
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let command = match positional.iter().map(String::as_str).collect::<Vec<_>>()[..] {
        ["scan", dir] => Command::Scan(PathBuf::from(dir)),
        ["next", dir] => Command::Next {
            dir: PathBuf::from(dir),
            budget,
        },
        ["annotate", a, b, label] => Command::Annotate {
            a: parse_id(a),
            b: parse_id(b),
            is_similar: parse_label(label).unwrap_or_else(|e| fail(&e.to_string())),
            wait,
        },
        ["resolve", id] => Command::Resolve(parse_id(id)),
        ["retrain"] => Command::Retrain,
        ["stats"] => Command::Stats,
        _ => fail("Missing or malformed command"),
    };

    Cli {
        config_path,
        command,
    }
}

fn parse_id(text: &str) -> i64 {
    text.parse()
        .unwrap_or_else(|_| fail(&format!("Not an image id: {}", text)))
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    print_help();
    std::process::exit(1);
}

fn print_help() {
    println!(
        r#"simpair - label image pairs as similar or not, with a classifier choosing what to ask next

USAGE:
    simpair [OPTIONS] <COMMAND>

COMMANDS:
    scan DIR                    Embed every image in DIR and list them
    next DIR [--budget-ms N]    Show the most promising unlabeled pair in DIR
    annotate A B LABEL [--wait] Label images A and B (similar/different, yes/no, 1/0)
    resolve ID                  Print the file behind an image id
    retrain                     Rebuild the classifier from all labels
    stats                       Show image, label and classifier counts

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    SIMPAIR_CONFIG      Path to config file (overrides default location)
    SIMPAIR_LOG         Log level (trace, debug, info, warn, error)
    ORT_DYLIB_PATH      Path to the ONNX Runtime shared library

Config file location: $XDG_CONFIG_HOME/simpair/config.toml

Output is JSON on stdout; logs go to journald or the log directory."#
    );
}

fn image_json(image: &Image) -> serde_json::Value {
    json!({ "id": image.id, "file": image.file })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_args();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    if let Err(e) = logging::init(None) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let config = match cli.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    let labeler = Labeler::open(&config)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;

    let output = match cli.command {
        Command::Scan(dir) => {
            let images = labeler.scan_directory(&dir).await?;
            json!(images.iter().map(image_json).collect::<Vec<_>>())
        }
        Command::Next { dir, budget } => {
            // Picks up labels whose background retrain never finished.
            labeler.refresh().await?;
            let candidate = match budget {
                Some(budget) => labeler.next_pair_within(&dir, budget).await?,
                None => labeler.next_pair(&dir).await?,
            };
            match candidate {
                Some(pair) => json!({
                    "a": image_json(&pair.a),
                    "b": image_json(&pair.b),
                    "score": pair.score,
                    "pairs_scored": pair.pairs_scored,
                    "exhausted": pair.exhausted,
                }),
                None => serde_json::Value::Null,
            }
        }
        Command::Annotate {
            a,
            b,
            is_similar,
            wait,
        } => {
            let submission = labeler.record_annotation(a, b, is_similar)?;
            let mut output = json!({ "annotation_id": submission.annotation_id });
            if wait {
                let outcome = submission.retrain.await??;
                output["generation"] = json!(outcome.generation);
                output["loss"] = json!(outcome.report.map(|r| r.final_loss));
            }
            output
        }
        Command::Resolve(id) => json!({ "id": id, "file": labeler.resolve_image_file(id)? }),
        Command::Retrain => {
            let outcome = labeler.retrain_now().await?;
            json!({
                "generation": outcome.generation,
                "examples": outcome.report.as_ref().map_or(0, |r| r.examples),
                "loss": outcome.report.map(|r| r.final_loss),
            })
        }
        Command::Stats => json!(labeler.stats()?),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
