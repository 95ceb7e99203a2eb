use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use taskboard::backend::{BackendError, RestBackend, TaskDraft, TaskPatch, TaskPriority, TaskStatus};
use taskboard::config::{Config, ConfigError};
use taskboard::services::projects::ProjectError;
use taskboard::services::team::TeamError;
use taskboard::services::{auth, listener, persistence, projects, team};
use taskboard::state::{AppState, AuthStore, PersistedAuth};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("{0}")]
    Auth(String),
    #[error(transparent)]
    Team(#[from] TeamError),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error("invalid date `{0}`; expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "taskboard", about = "Task board auth, team and task CLI")]
struct Cli {
    /// Where the signed-in user and profile are kept between runs.
    #[arg(long, env = "AUTH_STATE_PATH")]
    state_path: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TASKBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Signup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "TASKBOARD_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    /// Print the cached user and profile.
    Whoami,
    /// Re-read the profile row, creating it if missing.
    Profile,
    Team {
        #[arg(long, default_value = "")]
        search: String,
    },
    Project(ProjectCommand),
    Task(TaskCommand),
}

#[derive(Args, Debug)]
struct ProjectCommand {
    #[command(subcommand)]
    command: ProjectSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProjectSubcommand {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
}

#[derive(Args, Debug)]
struct TaskCommand {
    #[command(subcommand)]
    command: TaskSubcommand,
}

#[derive(Subcommand, Debug)]
enum TaskSubcommand {
    List {
        project_id: Uuid,
    },
    Create {
        project_id: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "medium")]
        priority: TaskPriority,
        #[arg(long)]
        assignee: Option<Uuid>,
        #[arg(long, help = "Due date as YYYY-MM-DD")]
        due: Option<String>,
    },
    Update {
        task_id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        priority: Option<TaskPriority>,
        #[arg(long)]
        assignee: Option<Uuid>,
        #[arg(long, help = "Due date as YYYY-MM-DD")]
        due: Option<String>,
    },
    Delete {
        task_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();

    let mut config = Config::from_env()?;
    if let Some(path) = cli.state_path {
        config.auth_state_path = path;
    }

    let backend = Arc::new(RestBackend::new(config.backend.clone())?);
    let store = match persistence::load(&config.auth_state_path).await {
        Some(persisted) => AuthStore::rehydrate(persisted),
        None => AuthStore::new(),
    };
    let state = AppState::new(backend, store, config.profile_wait);

    let listener_task = listener::spawn_auth_listener(state.clone());
    let persist_task = persistence::spawn_persistence_task(&state.auth, config.auth_state_path.clone());

    let result = run(&state, cli.command).await;

    listener_task.abort();
    persist_task.abort();
    if let Err(e) = persistence::save(&config.auth_state_path, &state.auth.persisted()).await {
        tracing::error!(error = %e, "final auth state save failed");
    }
    result
}

async fn run(state: &AppState, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login { email, password } => {
            auth::login(state, &email, &password).await;
            finish_auth(state).await
        }
        Command::Signup { name, email, password } => {
            auth::signup(state, &name, &email, &password).await;
            finish_auth(state).await
        }
        Command::Logout => {
            auth::logout(state).await;
            if let Some(message) = state.auth.snapshot().error {
                return Err(CliError::Auth(message));
            }
            eprintln!("signed out");
            Ok(())
        }
        Command::Whoami => print_json(&state.auth.persisted()),
        Command::Profile => {
            auth::fetch_profile(state).await;
            finish_auth(state).await
        }
        Command::Team { search } => {
            let members = team::fetch_team(state).await?;
            print_json(&team::filter_members(&members, &search))
        }
        Command::Project(project) => run_project(state, project).await,
        Command::Task(task) => run_task(state, task).await,
    }
}

/// Report the outcome of an auth operation and print the resulting identity.
async fn finish_auth(state: &AppState) -> Result<(), CliError> {
    let snapshot = state.auth.snapshot();
    if let Some(message) = snapshot.error {
        auth::clear_error(state);
        return Err(CliError::Auth(message));
    }
    // The listener may have taken over the profile fetch, or an earlier attempt failed.
    if snapshot.user.is_some() && snapshot.profile.is_none() {
        auth::fetch_profile(state).await;
    }
    let snapshot = state.auth.snapshot();
    if let Some(message) = &snapshot.profile_error {
        eprintln!("warning: profile unavailable: {message}");
    }
    print_json(&PersistedAuth::from(&snapshot))
}

async fn run_project(state: &AppState, project: ProjectCommand) -> Result<(), CliError> {
    match project.command {
        ProjectSubcommand::List => print_json(&projects::list_projects(state).await?),
        ProjectSubcommand::Create { name, description } => {
            print_json(&projects::create_project(state, &name, description.as_deref()).await?)
        }
    }
}

async fn run_task(state: &AppState, task: TaskCommand) -> Result<(), CliError> {
    match task.command {
        TaskSubcommand::List { project_id } => print_json(&projects::list_tasks(state, project_id).await?),
        TaskSubcommand::Create { project_id, title, description, priority, assignee, due } => {
            let draft = TaskDraft {
                project_id,
                title,
                description,
                priority,
                assignee_id: assignee,
                due_date: due.as_deref().map(parse_date).transpose()?,
            };
            print_json(&projects::create_task(state, draft).await?)
        }
        TaskSubcommand::Update { task_id, title, description, status, priority, assignee, due } => {
            let patch = TaskPatch {
                title,
                description,
                status,
                priority,
                assignee_id: assignee,
                due_date: due.as_deref().map(parse_date).transpose()?,
            };
            print_json(&projects::update_task(state, task_id, patch).await?)
        }
        TaskSubcommand::Delete { task_id } => {
            projects::delete_task(state, task_id).await?;
            eprintln!("deleted task: {task_id}");
            Ok(())
        }
    }
}

fn parse_date(raw: &str) -> Result<time::Date, CliError> {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    time::Date::parse(raw.trim(), format).map_err(|_| CliError::InvalidDate(raw.to_owned()))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
