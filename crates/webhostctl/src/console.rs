//! Line-oriented console: the interactive front end over [`Manager`].

use common::{ServerFields, ServerMode};
use host_manager::{ControlError, Manager};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

pub const HELP: &str = "\
commands:
  create <name> <site|storage|neuro> [port] [max_gb]   register and start
  register <name> <mode> [port] [max_gb]             register only
  start <name>
  stop <name>
  delete <name>                                      keeps the server's files
  edit <name> key=value...                           keys: mode port max_gb host
  list
  help
  quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Create {
        name: String,
        mode: ServerMode,
        port: Option<u16>,
        max_gb: Option<f64>,
        start: bool,
    },
    Start(String),
    Stop(String),
    Delete(String),
    Edit(String, ServerFields),
    List,
    Help,
    Quit,
}

pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let name = |args: &[&str]| -> Result<String, String> {
        args.first()
            .map(|s| s.to_string())
            .ok_or_else(|| format!("usage: {} <name>", verb))
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "create" | "register" => {
            if args.len() < 2 {
                return Err(format!("usage: {} <name> <mode> [port] [max_gb]", verb));
            }
            let mode = args[1].parse::<ServerMode>()?;
            // Non-numeric ports fall back to the default, like the desktop form.
            let port = args.get(2).and_then(|p| p.parse::<u16>().ok());
            let max_gb = match args.get(3) {
                Some(raw) => Some(parse_max_gb(raw)?),
                None => None,
            };
            ConsoleCommand::Create {
                name: args[0].to_string(),
                mode,
                port,
                max_gb,
                start: verb.eq_ignore_ascii_case("create"),
            }
        }
        "start" => ConsoleCommand::Start(name(&args)?),
        "stop" => ConsoleCommand::Stop(name(&args)?),
        "delete" | "rm" => ConsoleCommand::Delete(name(&args)?),
        "edit" => {
            let target = name(&args)?;
            let fields = parse_fields(&args[1..])?;
            if fields.is_empty() {
                return Err("usage: edit <name> key=value...".to_string());
            }
            ConsoleCommand::Edit(target, fields)
        }
        "list" | "ls" => ConsoleCommand::List,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command `{}` (try `help`)", other)),
    };
    Ok(Some(command))
}

fn parse_max_gb(raw: &str) -> Result<f64, String> {
    raw.parse::<f64>()
        .ok()
        .filter(|gb| gb.is_finite() && *gb >= 0.0)
        .ok_or_else(|| format!("invalid max_gb `{}`", raw))
}

fn parse_fields(pairs: &[&str]) -> Result<ServerFields, String> {
    let mut fields = ServerFields::default();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got `{}`", pair))?;
        match key {
            "mode" => fields.mode = Some(value.parse()?),
            "port" => {
                fields.port = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid port `{}`", value))?,
                )
            }
            "max_gb" => fields.max_gb = Some(parse_max_gb(value)?),
            "host" => fields.host = Some(value.to_string()),
            other => return Err(format!("unknown field `{}`", other)),
        }
    }
    Ok(fields)
}

/// Execute one command and return the text to show. `None` means quit.
pub async fn execute(manager: &Manager, command: ConsoleCommand) -> Option<String> {
    let text = match command {
        ConsoleCommand::Create {
            name,
            mode,
            port,
            max_gb,
            start,
        } => {
            let result = if start {
                manager.create_server(&name, mode, port, max_gb).await
            } else {
                manager.register_server(&name, mode, port, max_gb)
            };
            match result {
                Ok(entry) if start => format!("✅ Server {} started at {}", entry.name, entry.url()),
                Ok(entry) => format!("✅ Server {} registered at {}", entry.name, entry.url()),
                Err(err @ ControlError::Start { .. }) => {
                    format!("⚠️ {} (retry with `start {}`)", err, name)
                }
                Err(err) => format!("❌ {}", err),
            }
        }
        ConsoleCommand::Start(name) => match manager.start_server(&name).await {
            Ok(entry) => format!("✅ Server {} started at {}", entry.name, entry.url()),
            Err(err) => format!("❌ {}", err),
        },
        ConsoleCommand::Stop(name) => match manager.stop_server(&name).await {
            Ok(_) => format!("🛑 Server {} stopped", name),
            Err(err) => format!("❌ {}", err),
        },
        ConsoleCommand::Delete(name) => match manager.delete_server(&name).await {
            Ok(_) => format!("🗑️ Server {} deleted (files kept)", name),
            Err(err) => format!("❌ {}", err),
        },
        ConsoleCommand::Edit(name, fields) => match manager.edit_server(&name, &fields).await {
            Ok(entry) => {
                let mut text = format!("✏️ {}", entry);
                if manager.supervisor().is_running(&name).await {
                    text.push_str("\n   running instance keeps its old settings until restarted");
                }
                text
            }
            Err(err) => format!("❌ {}", err),
        },
        ConsoleCommand::List => {
            let status = manager.status().await;
            if status.is_empty() {
                "(no servers)".to_string()
            } else {
                status
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => return None,
    };
    Some(text)
}

/// Read commands from stdin until `quit`, EOF or Ctrl-C.
pub async fn run(manager: &Manager) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("{}", HELP);
    loop {
        stdout.write_all(b"webhost> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(command)) => match execute(manager, command).await {
                Some(text) => println!("{}", text),
                None => break,
            },
            Err(message) => println!("❌ {}", message),
        }
    }
    Ok(())
}
