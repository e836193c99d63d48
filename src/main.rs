//! CLI entry point for `mailconv`.

use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};

use mailconv::attachment;
use mailconv::config::Config;
use mailconv::convert::MessageConverter;
use mailconv::model::field::{fields_from_names, MailField};
use mailconv::model::record::MailRecord;
use mailconv::parser::header::HeaderBlockLoader;
use mailconv::wire::parsed::ParsedMessage;

#[derive(Parser)]
#[command(name = "mailconv", version, about = "Inspect and convert RFC 822 messages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (overrides MAILCONV_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the decoded header block
    Headers {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Convert a message into a record
    Convert {
        path: PathBuf,
        /// Comma-separated field names (default: all)
        #[arg(short, long, value_delimiter = ',', default_value = "all")]
        fields: Vec<String>,
        /// Copy the raw value of this header (repeatable)
        #[arg(long, value_name = "NAME")]
        capture: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Report whether the message has an attachment
    Attachment {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => mailconv::config::load_config_from(path),
        None => mailconv::config::load_config(),
    };

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Headers { path, json } => cmd_headers(&path, json, &config),
        Commands::Convert {
            path,
            fields,
            capture,
            json,
        } => cmd_convert(&path, &fields, &capture, json, &config),
        Commands::Attachment { path, json } => cmd_attachment(&path, json, &config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = mailconv::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailconv.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

fn read_message(path: &Path) -> anyhow::Result<ParsedMessage> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    Ok(ParsedMessage::from_bytes(std::fs::read(path)?))
}

fn cmd_headers(path: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    let message = read_message(path)?;
    let headers = HeaderBlockLoader::new(config.mail.max_header_bytes).load(&message)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&headers)?);
    } else {
        for (name, value) in headers.iter() {
            println!("{name}: {value}");
        }
    }
    Ok(())
}

fn cmd_convert(
    path: &Path,
    names: &[String],
    capture: &[String],
    json: bool,
    config: &Config,
) -> anyhow::Result<()> {
    let fields = fields_from_names(names)?;
    let message = read_message(path)?;
    let converter =
        MessageConverter::new(&config.mail).with_max_header_bytes(config.mail.max_header_bytes);
    let record = converter.convert_capturing(&message, &fields, capture)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record_json(&record))?);
    } else {
        print_record_table(&record);
    }
    Ok(())
}

fn cmd_attachment(path: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    let message = read_message(path)?;
    let resolution = attachment::resolve(&message, &config.mail)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
    } else {
        println!(
            "{} ({:?})",
            if resolution.has_attachment { "yes" } else { "no" },
            resolution.evidence
        );
    }
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailconv", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// The populated fields only, keyed by field name.
fn record_json(record: &MailRecord) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for field in record.present().iter() {
        let value = match field {
            MailField::Id => serde_json::json!(record.mail_id),
            MailField::FolderId => serde_json::json!(record.folder_id),
            MailField::ContentType => serde_json::json!({
                "type": record.content_type.as_ref().map(ToString::to_string),
                "id": record.content_id,
                "disposition": record.content_disposition.as_ref().map(ToString::to_string),
            }),
            MailField::From => serde_json::json!(record.from),
            MailField::To => serde_json::json!(record.to),
            MailField::Cc => serde_json::json!(record.cc),
            MailField::Bcc => serde_json::json!(record.bcc),
            MailField::ReplyTo => serde_json::json!(record.reply_to),
            MailField::Subject => serde_json::json!(record.subject),
            MailField::Size => serde_json::json!(record.size),
            MailField::SentDate => serde_json::json!(record.sent_date.map(|d| d.to_rfc3339())),
            MailField::ReceivedDate => {
                serde_json::json!(record.received_date.map(|d| d.to_rfc3339()))
            }
            MailField::Flags => serde_json::json!({
                "flags": record.flags,
                "user_flags": record.user_flags,
            }),
            MailField::ThreadLevel => serde_json::json!(record.thread_level),
            MailField::DispositionNotificationTo => {
                serde_json::json!(record.disposition_notification_to)
            }
            MailField::Priority => serde_json::json!(record.priority),
            MailField::ColorLabel => serde_json::json!(record.color_label),
            MailField::Headers => serde_json::json!(record.headers),
            MailField::Attachment => serde_json::json!(record.has_attachment),
            MailField::Body | MailField::Full | MailField::AccountName | MailField::All => continue,
        };
        map.insert(field.name().to_string(), value);
    }
    if let Some(captured) = &record.captured_headers {
        map.insert("captured_headers".to_string(), serde_json::json!(captured));
    }
    serde_json::Value::Object(map)
}

fn print_record_table(record: &MailRecord) {
    let join = |addresses: &[mailconv::model::address::MailAddress]| {
        addresses
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!();
    for field in record.present().iter() {
        let value = match field {
            MailField::Id => record.mail_id.clone().unwrap_or_default(),
            MailField::FolderId => record.folder_id.clone().unwrap_or_default(),
            MailField::ContentType => record
                .content_type
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            MailField::From => join(&record.from),
            MailField::To => join(&record.to),
            MailField::Cc => join(&record.cc),
            MailField::Bcc => join(&record.bcc),
            MailField::ReplyTo => join(&record.reply_to),
            MailField::Subject => record.subject.clone().unwrap_or_default(),
            MailField::Size => record.size.to_string(),
            MailField::SentDate => record.sent_date.map(|d| d.to_rfc2822()).unwrap_or_default(),
            MailField::ReceivedDate => record
                .received_date
                .map(|d| d.to_rfc2822())
                .unwrap_or_default(),
            MailField::Flags => format!("{:?}", record.flags),
            MailField::ThreadLevel => record.thread_level.to_string(),
            MailField::DispositionNotificationTo => record
                .disposition_notification_to
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            MailField::Priority => format!("{:?}", record.priority),
            MailField::ColorLabel => record.color_label.to_string(),
            MailField::Headers => {
                let count = record.headers.as_ref().map_or(0, |h| h.len());
                format!("{count} headers")
            }
            MailField::Attachment => record.has_attachment.to_string(),
            MailField::Body | MailField::Full | MailField::AccountName | MailField::All => continue,
        };
        println!("  {:<28} {}", field.name(), value);
    }
    if let Some(captured) = &record.captured_headers {
        for (name, value) in captured.iter() {
            println!("  {:<28} {}", name, value);
        }
    }
    println!();
}
