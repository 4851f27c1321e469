use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

mod flows;
mod settings;

use settings::load_settings;

#[derive(Parser, Debug)]
#[command(name = "console", about = "Drive admin console pages against a live backend")]
struct Cli {
    #[arg(long, default_value = "console.toml")]
    config: PathBuf,
    /// Overrides the configured backend URL.
    #[arg(long)]
    server_url: Option<String>,
    /// Bearer token sent with every request.
    #[arg(long)]
    token: Option<String>,
    /// Print every snapshot change as one JSON line.
    #[arg(long)]
    trace_snapshots: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    Privileges {
        #[arg(long)]
        filter: Option<String>,
        /// Repeat a field to cycle its direction.
        #[arg(long = "sort")]
        sort: Vec<String>,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },
    Blobstore {
        name: String,
        #[arg(long = "set", value_parser = parse_assignment)]
        set: Vec<(String, Value)>,
        #[arg(long)]
        delete: bool,
        /// Create the store instead of editing an existing one.
        #[arg(long)]
        create: bool,
    },
}

/// `field=value`; the value is read as JSON when it parses, as a string otherwise.
fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got '{raw}'"))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(format!("missing field name in '{raw}'"));
    }
    let value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((field.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }

    let console = flows::Console::new(&settings, cli.token, cli.trace_snapshots)?;
    match cli.command {
        Command::Login { username, password } => console.login(&username, &password).await,
        Command::Privileges {
            filter,
            sort,
            page,
            page_size,
        } => {
            let page_size = page_size.unwrap_or(settings.page_size);
            console
                .privileges(filter.as_deref(), &sort, page, page_size)
                .await
        }
        Command::Blobstore {
            name,
            set,
            delete,
            create,
        } => console.blob_store(&name, set, delete, create).await,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn assignments_parse_json_values_or_fall_back_to_strings() {
        assert_eq!(
            parse_assignment("softQuotaBytes=1024").expect("parse"),
            ("softQuotaBytes".to_string(), json!(1024))
        );
        assert_eq!(
            parse_assignment("path=/var/blobs").expect("parse"),
            ("path".to_string(), json!("/var/blobs"))
        );
        assert_eq!(
            parse_assignment("bucket=").expect("parse"),
            ("bucket".to_string(), json!(""))
        );
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=1").is_err());
    }

    #[test]
    fn cli_accepts_repeated_flags() {
        let cli = Cli::try_parse_from([
            "console",
            "--trace-snapshots",
            "blobstore",
            "default",
            "--set",
            "type=s3",
            "--set",
            "bucket=archive",
        ])
        .expect("parse");
        assert!(cli.trace_snapshots);
        let Command::Blobstore { name, set, delete, .. } = cli.command else {
            panic!("expected blobstore command");
        };
        assert_eq!(name, "default");
        assert_eq!(set.len(), 2);
        assert!(!delete);

        let cli = Cli::try_parse_from(["console", "privileges", "--sort", "name", "--sort", "name"])
            .expect("parse");
        let Command::Privileges { sort, page, .. } = cli.command else {
            panic!("expected privileges command");
        };
        assert_eq!(sort, vec!["name", "name"]);
        assert_eq!(page, 0);
    }
}
