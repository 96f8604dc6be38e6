use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskso::AppContext;
use taskso::config::ClientConfig;
use taskso::dashboard::{Dashboard, DetailOutcome};
use taskso::error::AppError;
use taskso::gateway::InMemoryService;
use taskso::guard::{Decision, Navigator, Route};
use taskso::models::{Category, NewTask, Priority, Task, TaskPatch, TaskStatus};
use taskso::services::wheel;

const DEMO_EMAIL: &str = "demo@taskso.local";
const DEMO_PASSWORD: &str = "demo";

#[derive(Debug, Parser)]
#[command(name = "taskso", version, about = "Track, filter and randomly pick personal tasks")]
struct Cli {
    /// Run against an in-process service seeded with a demo account.
    #[arg(long, global = true, env = "TASKSO_OFFLINE")]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TASKSO_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    Logout,
    Whoami,
    /// List tasks; defaults to open tasks in the family category.
    List(ListArgs),
    Show {
        id: String,
    },
    Create(CreateArgs),
    Update(UpdateArgs),
    Delete {
        id: String,
    },
    /// Pick one of your tasks at random.
    Spin,
    /// Keep the dashboard on screen, refreshing periodically.
    Watch {
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
        every_secs: u64,
    },
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long, conflicts_with = "any_status")]
    status: Option<TaskStatus>,
    #[arg(long)]
    any_status: bool,
    #[arg(long, conflicts_with = "any_category")]
    category: Option<Category>,
    #[arg(long)]
    any_category: bool,
    /// Bypass the cache.
    #[arg(long)]
    reload: bool,
}

#[derive(Debug, Args)]
struct CreateArgs {
    title: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    status: Option<TaskStatus>,
    #[arg(long)]
    priority: Option<Priority>,
    #[arg(long)]
    category: Option<Category>,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    status: Option<TaskStatus>,
    #[arg(long)]
    priority: Option<Priority>,
    #[arg(long)]
    category: Option<Category>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    Failed(String),
    #[error("not signed in; run `taskso login` first")]
    SignedOut,
    #[error(transparent)]
    App(#[from] AppError),
}

impl Command {
    fn route(&self) -> Route {
        match self {
            Command::Login { .. } | Command::Logout => Route::Login,
            Command::Register { .. } => Route::Register,
            Command::Spin => Route::Spin,
            Command::Show { id } | Command::Delete { id } => Route::TaskDetails(id.clone()),
            Command::Update(args) => Route::TaskDetails(args.id.clone()),
            Command::Whoami | Command::List(_) | Command::Create(_) | Command::Watch { .. } => {
                Route::Dashboard
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "taskso=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = ClientConfig::new_from_env()?;
    let ctx = if cli.offline {
        offline_context(config).await?
    } else {
        let ctx = AppContext::connect(config).await?;
        ctx.session.restore().await;
        ctx
    };

    let mut nav = ctx.navigator();
    if let Decision::Redirect(to) = nav.navigate(cli.command.route()) {
        info!("guard redirected to {}", to);
        return Err(CliError::SignedOut);
    }

    match cli.command {
        Command::Login { email, password } => {
            if !ctx.session.login(&email, &password).await {
                return Err(session_error(&ctx, "Login failed"));
            }
            print_whoami(&ctx);
        }
        Command::Register {
            name,
            email,
            password,
            confirm_password,
        } => {
            if !ctx
                .session
                .register(&name, &email, &password, &confirm_password)
                .await
            {
                return Err(session_error(&ctx, "Registration failed"));
            }
            print_whoami(&ctx);
        }
        Command::Logout => {
            ctx.session.logout().await;
            println!("Signed out.");
        }
        Command::Whoami => print_whoami(&ctx),
        Command::List(args) => {
            let mut dash = ctx.dashboard();
            let filter = dash.filter_mut();
            if args.any_status {
                filter.set_status(None);
            } else if let Some(status) = args.status {
                filter.set_status(Some(status));
            }
            if args.any_category {
                filter.set_category(None);
            } else if let Some(category) = args.category {
                filter.set_category(Some(category));
            }
            let ticket = if args.reload { dash.reload() } else { dash.load() };
            let outcome = ticket.resolve().await;
            dash.apply(outcome);
            render(&dash)?;
        }
        Command::Show { id } => match ctx.dashboard().details(&id).await {
            DetailOutcome::Loaded(task) => print_details(&task),
            DetailOutcome::NotFound => return Err(CliError::Failed(format!("Task {} not found", id))),
            DetailOutcome::Failed(message) => return Err(CliError::Failed(message)),
        },
        Command::Create(args) => {
            let mut new = NewTask::new(args.title);
            if let Some(description) = args.description {
                new = new.with_description(description);
            }
            if let Some(status) = args.status {
                new = new.with_status(status);
            }
            if let Some(priority) = args.priority {
                new = new.with_priority(priority);
            }
            if let Some(category) = args.category {
                new = new.with_category(category);
            }
            let mut dash = ctx.dashboard();
            let created = dash.create(new).await;
            guard_after(&mut nav)?;
            let created = created.ok_or_else(|| view_error(&dash, "Failed to create task"))?;
            println!("Created {}", created.id);
        }
        Command::Update(args) => {
            let patch = TaskPatch {
                title: args.title,
                description: args.description,
                status: args.status,
                priority: args.priority,
                category: args.category,
                ..Default::default()
            };
            let mut dash = ctx.dashboard();
            let updated = dash.update(&args.id, patch).await;
            guard_after(&mut nav)?;
            let updated = updated.ok_or_else(|| view_error(&dash, "Failed to update task"))?;
            print_details(&updated);
        }
        Command::Delete { id } => {
            let mut dash = ctx.dashboard();
            let deleted = dash.delete(&id).await;
            guard_after(&mut nav)?;
            if !deleted {
                return Err(view_error(&dash, "Failed to delete task"));
            }
            println!("Deleted {}", id);
        }
        Command::Spin => {
            let picked = wheel::spin(&ctx.tasks).await;
            guard_after(&mut nav)?;
            match picked? {
                Some(task) => print_details(&task),
                None => println!("No tasks to pick from."),
            }
        }
        Command::Watch { every_secs } => watch(&ctx, nav, Duration::from_secs(every_secs)).await?,
    }
    Ok(())
}

/// Builds an offline context, signed in to a demo account with a few tasks.
async fn offline_context(config: ClientConfig) -> Result<AppContext, CliError> {
    let service = Arc::new(InMemoryService::new().with_account("Demo", DEMO_EMAIL, DEMO_PASSWORD));
    let ctx = AppContext::offline(config, service);
    if !ctx.session.login(DEMO_EMAIL, DEMO_PASSWORD).await {
        return Err(session_error(&ctx, "Demo login failed"));
    }
    let seed = [
        NewTask::new("Call grandma").with_category(Category::Family),
        NewTask::new("Morning run")
            .with_category(Category::Sport)
            .with_priority(Priority::High),
        NewTask::new("Ten minutes of breathing").with_category(Category::Meditation),
    ];
    for task in seed {
        ctx.tasks.create_task(task).await?;
    }
    Ok(ctx)
}

async fn watch(ctx: &AppContext, mut nav: Navigator, every: Duration) -> Result<(), CliError> {
    tokio::spawn(ctx.auth_monitor().start());

    let mut dash = ctx.dashboard();
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let outcome = dash.reload().resolve().await;
                dash.apply(outcome);
                render(&dash)?;
            }
            decision = nav.changed() => match decision {
                Some(Decision::Redirect(_)) | None => return Err(CliError::SignedOut),
                Some(Decision::Allow) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                dash.leave();
                return Ok(());
            }
        }
    }
}

/// Re-applies the guard after an operation that may have ended the session.
fn guard_after(nav: &mut Navigator) -> Result<(), CliError> {
    match nav.sync() {
        Some(_) => Err(CliError::SignedOut),
        None => Ok(()),
    }
}

fn session_error(ctx: &AppContext, fallback: &str) -> CliError {
    CliError::Failed(ctx.session.snapshot().error.unwrap_or_else(|| fallback.to_string()))
}

fn view_error(dash: &Dashboard, fallback: &str) -> CliError {
    CliError::Failed(dash.view().error.clone().unwrap_or_else(|| fallback.to_string()))
}

fn print_whoami(ctx: &AppContext) {
    match ctx.session.snapshot().user {
        Some(user) => println!("{} <{}>", user.name, user.email),
        None => println!("Not signed in."),
    }
}

fn render(dash: &Dashboard) -> Result<(), CliError> {
    let view = dash.view();
    if let Some(error) = &view.error {
        if view.tasks.is_none() {
            return Err(CliError::Failed(error.clone()));
        }
        warn!("showing stale tasks: {}", error);
    }
    println!("# {}", view.query);
    match view.tasks.as_deref() {
        Some(tasks) if !tasks.is_empty() => tasks.iter().for_each(print_row),
        _ => println!("(no tasks)"),
    }
    Ok(())
}

fn print_row(task: &Task) {
    println!(
        "{}  [{}] {} ({}, {})",
        task.id, task.status, task.title, task.category, task.priority
    );
}

fn print_details(task: &Task) {
    print_row(task);
    if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
        println!("    {}", description);
    }
    println!(
        "    created {}  updated {}",
        task.created_at.format("%Y-%m-%d %H:%M"),
        task.updated_at.format("%Y-%m-%d %H:%M")
    );
}
