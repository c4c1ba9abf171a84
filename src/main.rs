use std::sync::Arc;

use taskdeck::api::HttpClient;
use taskdeck::config::ClientConfig;
use taskdeck::console::{self, Command, ConsoleLine};
use taskdeck::error::AppError;
use taskdeck::models::TaskId;
use taskdeck::services::{
    ChannelReminderSink, ChatService, DueTaskNotifier, PermissionState, SessionService,
    SessionState, StaticPermission, TaskReconciler,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct View {
    config: ClientConfig,
    session: SessionService,
    tasks: TaskReconciler,
    chat: ChatService,
    permission: Arc<StaticPermission>,
    notifier: DueTaskNotifier,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "taskdeck=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::new_from_env()?;
    info!("using backend at {}", config.api_url);

    let client = Arc::new(HttpClient::new(&config)?);
    let session = SessionService::new(client.clone());

    match session.check().await? {
        SessionState::Active(user) => {
            info!("session active for {}", user.email.as_deref().unwrap_or("unknown user"));
        }
        SessionState::LoginRequired => match &config.credentials {
            Some(credentials) => {
                session.login(credentials).await?;
            }
            None => {
                error!("not logged in: set TASKDECK_ACCESS_TOKEN or TASKDECK_EMAIL/TASKDECK_PASSWORD");
                return Ok(());
            }
        },
    }

    let tasks = TaskReconciler::new(client.clone());
    if let Err(e) = tasks.load().await {
        error!("Failed to load tasks: {}", e);
        println!("Could not load tasks ({}). Type `reload` to retry.", e);
    }

    let (reminder_tx, mut reminders) = mpsc::unbounded_channel();
    let permission = Arc::new(StaticPermission::new(
        config.notification_permission == PermissionState::Granted,
    ));
    let notifier = DueTaskNotifier::new(
        client.clone(),
        permission.clone(),
        Arc::new(ChannelReminderSink::new(reminder_tx)),
    )
    .with_poll_interval(config.poll_interval);

    let mut view = View {
        config,
        session,
        tasks,
        chat: ChatService::new(client.clone()),
        permission,
        notifier,
    };

    if view.notifier.request_permission().await != PermissionState::Granted {
        println!("Task reminders are off. Type `notify` to enable them.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            Some(reminder) = reminders.recv() => {
                println!("** {} - {}", reminder.title, reminder.body);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match ConsoleLine::parse_line(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => command,
                    Err(e) => {
                        // Covers `help` as well as usage mistakes.
                        let _ = e.print();
                        continue;
                    }
                };
                match view.run(command).await {
                    Ok(()) => {}
                    Err(AppError::Unauthorized) => {
                        if !view.relogin().await {
                            break;
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
        }
    }

    view.notifier.shutdown().await;
    info!("bye");
    Ok(())
}

impl View {
    async fn run(&mut self, command: Command) -> Result<(), AppError> {
        match command {
            Command::List { status } => {
                let tasks = self.tasks.filtered(status).await;
                if tasks.is_empty() {
                    println!("No tasks yet");
                }
                for task in &tasks {
                    println!("{}", console::format_task(task));
                }
            }
            Command::Add { title, fields } => {
                let task = self.tasks.create(Command::draft(&title, &fields)).await?;
                println!("{}", console::format_task(&task));
            }
            Command::Edit {
                id,
                title,
                fields,
                clear_due,
                clear_description,
            } => {
                let patch = Command::patch(&title, &fields, clear_due, clear_description)?;
                let task = self.tasks.update(&TaskId::new(id), patch).await?;
                println!("{}", console::format_task(&task));
            }
            Command::Toggle { id } => {
                let task = self.tasks.toggle_completion(&TaskId::new(id)).await?;
                println!("{}", console::format_task(&task));
            }
            Command::Remove { id } => {
                self.tasks.delete(&TaskId::new(id.as_str())).await?;
                println!("Deleted {}", id);
            }
            Command::Chat { message } => {
                let reply = self.chat.send(&message.join(" ")).await?;
                println!("assistant: {}", reply);
                // The assistant may have changed tasks behind our back.
                self.tasks.load().await?;
            }
            Command::EnableNotifications => {
                self.permission.set_granted(true);
                let state = self.notifier.request_permission().await;
                println!("Notifications: {:?}", state);
            }
            Command::Reload => {
                let count = self.tasks.load().await?;
                println!("Loaded {} tasks", count);
            }
            Command::Quit => {}
        }
        Ok(())
    }

    /// The session is gone; log in again if we can, otherwise give up.
    async fn relogin(&self) -> bool {
        let Some(credentials) = &self.config.credentials else {
            println!("Your session has expired. Please log in again.");
            return false;
        };
        match self.session.login(credentials).await {
            Ok(SessionState::Active(_)) => {
                println!("Session renewed, please retry.");
                true
            }
            Ok(SessionState::LoginRequired) => false,
            Err(e) => {
                warn!("Re-login failed: {}", e);
                false
            }
        }
    }
}
