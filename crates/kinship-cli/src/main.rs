use anyhow::Result;
use clap::{Parser, Subcommand};
use kinship_core::{IdPolicy, NewUser, UserGraph};
use kinship_server::config::ServerConfig;
use reqwest::blocking::{Client, RequestBuilder};
use rustyline::DefaultEditor;
use std::io::{self, Write};
use std::net::SocketAddr;
use tokio::runtime::Runtime;

#[derive(Parser)]
#[command(name = "kinship", version, about = "Kinship friendship graph CLI", long_about = None)]
struct Cli {
    /// Start HTTP server
    #[arg(long)]
    serve: bool,

    /// Address to bind when serving
    #[arg(long, default_value = kinship_server::config::DEFAULT_LISTEN)]
    listen: SocketAddr,

    /// Id assignment when serving: monotonic or population
    #[arg(long, default_value = "monotonic")]
    id_policy: IdPolicy,

    /// Target server URL (enables network mode)
    #[arg(long, env = "KINSHIP_URL")]
    server_url: Option<String>,

    /// Start interactive shell over an in-memory graph
    #[arg(long)]
    repl: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a user
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        age: String,
    },
    /// Link two users as friends
    MakeFriends {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
    },
    /// Delete a user
    Delete {
        #[arg(long)]
        id: String,
    },
    /// List a user's friends
    Friends {
        #[arg(long)]
        id: String,
    },
    /// Overwrite a user's age
    UpdateAge {
        #[arg(long)]
        id: String,
        #[arg(long)]
        age: String,
    },
    /// Show a single user
    User {
        #[arg(long)]
        id: String,
    },
}

fn main() -> Result<()> {
    run(Cli::parse())
}

fn run(cli: Cli) -> Result<()> {
    if cli.serve {
        let mut config = ServerConfig::from_env()?;
        config.listen = cli.listen;
        config.id_policy = cli.id_policy;
        let rt = Runtime::new()?;
        return rt.block_on(kinship_server::serve(config));
    }

    if let Some(base) = cli.server_url.as_deref() {
        let client = Client::builder().user_agent("kinship-cli").build()?;
        match cli.command {
            Some(cmd) => println!("{}", run_net_command(&client, base, cmd)?.trim_end()),
            None => println!("In network mode (--server-url). Pass a subcommand, see --help."),
        }
        return Ok(());
    }

    if cli.repl || cli.command.is_none() {
        return run_repl(UserGraph::new());
    }

    anyhow::bail!("subcommands need --server-url; use --repl for a local shell")
}

fn run_net_command(client: &Client, base: &str, cmd: Commands) -> Result<String> {
    let base = base.trim_end_matches('/');
    let req = match cmd {
        Commands::Create { name, age } => client
            .post(format!("{base}/create"))
            .json(&serde_json::json!({ "name": name, "age": age })),
        Commands::MakeFriends { source, target } => client
            .post(format!("{base}/make_friends"))
            .json(&serde_json::json!({ "source_id": source, "target_id": target })),
        Commands::Delete { id } => client
            .delete(format!("{base}/user"))
            .json(&serde_json::json!({ "target_id": id })),
        Commands::Friends { id } => client.get(format!("{base}/friends/{id}")),
        Commands::UpdateAge { id, age } => client
            .put(format!("{base}/{id}"))
            .json(&serde_json::json!({ "new_age": age })),
        Commands::User { id } => client.get(format!("{base}/user/{id}")),
    };
    net_send(req)
}

fn net_send(req: RequestBuilder) -> Result<String> {
    let resp = req.send()?;
    let status = resp.status();
    let body = resp.text()?;
    if !status.is_success() {
        anyhow::bail!("server returned {status}: {}", body.trim_end());
    }
    Ok(body)
}

#[derive(Debug, PartialEq, Eq)]
enum ShellCommand {
    Create { name: String, age: String },
    Friend { source: String, target: String },
    Delete(String),
    Friends(String),
    Age { id: String, age: String },
    Show(String),
    List,
    Help,
    Quit,
}

fn parse_line(line: &str) -> std::result::Result<ShellCommand, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let arg = |i: usize, usage: &str| {
        parts
            .get(i)
            .map(|s| s.to_string())
            .ok_or_else(|| format!("usage: {usage}"))
    };
    match parts.first().copied().unwrap_or("") {
        "create" => Ok(ShellCommand::Create {
            name: arg(1, "create <name> <age>")?,
            age: arg(2, "create <name> <age>")?,
        }),
        "friend" => Ok(ShellCommand::Friend {
            source: arg(1, "friend <id> <id>")?,
            target: arg(2, "friend <id> <id>")?,
        }),
        "delete" => Ok(ShellCommand::Delete(arg(1, "delete <id>")?)),
        "friends" => Ok(ShellCommand::Friends(arg(1, "friends <id>")?)),
        "age" => Ok(ShellCommand::Age {
            id: arg(1, "age <id> <age>")?,
            age: arg(2, "age <id> <age>")?,
        }),
        "show" => Ok(ShellCommand::Show(arg(1, "show <id>")?)),
        "list" => Ok(ShellCommand::List),
        "help" => Ok(ShellCommand::Help),
        "quit" | "exit" => Ok(ShellCommand::Quit),
        other => Err(format!("unknown command '{other}'")),
    }
}

const SHELL_HELP: &str = "Commands: create <name> <age>, friend <id> <id>, delete <id>, friends <id>, age <id> <age>, show <id>, list, quit.";

fn exec(graph: &UserGraph, cmd: ShellCommand) -> Result<String> {
    let out = match cmd {
        ShellCommand::Create { name, age } => graph.create_user(NewUser::new(name, age)),
        ShellCommand::Friend { source, target } => {
            let (a, b) = graph.make_friends(&source, &target)?;
            format!("{a} и {b} теперь друзья")
        }
        ShellCommand::Delete(id) => format!("Удалён пользователь: {}", graph.delete_user(&id)?),
        ShellCommand::Friends(id) => serde_json::to_string(&graph.friends(&id)?)?,
        ShellCommand::Age { id, age } => {
            graph.update_age(&id, age)?;
            "Successfully".to_string()
        }
        ShellCommand::Show(id) => serde_json::to_string_pretty(&graph.get_user(&id)?)?,
        ShellCommand::List => graph
            .users()
            .iter()
            .map(|u| format!("{}\t{}\t{}\t{}", u.id, u.name, u.age, u.friends.join(",")))
            .collect::<Vec<_>>()
            .join("\n"),
        ShellCommand::Help => SHELL_HELP.to_string(),
        ShellCommand::Quit => String::new(),
    };
    Ok(out)
}

fn run_repl(graph: UserGraph) -> Result<()> {
    let mut rl = DefaultEditor::new().ok();
    println!("Kinship shell (in-memory). {SHELL_HELP}");
    loop {
        let prompt = "kinship> ";
        let line = if let Some(ref mut editor) = rl {
            match editor.readline(prompt) {
                Ok(l) => {
                    let _ = editor.add_history_entry(l.as_str());
                    l
                }
                Err(_) => break,
            }
        } else {
            print!("{prompt}");
            io::stdout().flush()?;
            let mut buf = String::new();
            if io::stdin().read_line(&mut buf)? == 0 {
                break;
            }
            buf
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(ShellCommand::Quit) => break,
            Ok(cmd) => match exec(&graph, cmd) {
                Ok(out) if !out.is_empty() => println!("{out}"),
                Ok(_) => {}
                Err(e) => eprintln!("error: {e}"),
            },
            Err(msg) => eprintln!("{msg}"),
        }
    }
    Ok(())
}
