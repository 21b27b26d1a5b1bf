mod api;
mod state;
mod ui;

use std::{
    env,
    future::Future,
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tally_api::v1::{CreateTodo, UpdateTodo};
use tokio::sync::mpsc;

use crate::{
    api::ApiClient,
    state::{Action, App, Mode},
};

const HEALTH_INTERVAL: Duration = Duration::from_secs(30);
const TICK: Duration = Duration::from_millis(100);

fn main() -> eyre::Result<()> {
    let base_url =
        env::var("TALLY_API_URL").unwrap_or_else(|_| String::from("http://localhost:5000"));

    let runtime = tokio::runtime::Runtime::new()?;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let ctx = Ctx {
        api: Arc::new(ApiClient::new(base_url)?),
        tx,
        handle: runtime.handle().clone(),
    };

    // Initial load: liveness check and full fetch, neither depends on the
    // other.
    ctx.check_health();
    ctx.fetch_todos();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = run(&mut terminal, &ctx, &mut rx);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ctx: &Ctx,
    actions: &mut mpsc::UnboundedReceiver<Action>,
) -> eyre::Result<()> {
    let mut app = App::new();
    let mut last_health = Instant::now();

    loop {
        while let Ok(action) = actions.try_recv() {
            app.apply(action);
        }

        if last_health.elapsed() >= HEALTH_INTERVAL {
            ctx.check_health();
            last_health = Instant::now();
        }

        terminal.draw(|frame| ui::draw(frame, &app))?;

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(&mut app, ctx, key);
                }
            }
        }

        if app.quit {
            return Ok(());
        }
    }
}

struct Ctx {
    api: Arc<ApiClient>,
    tx: mpsc::UnboundedSender<Action>,
    handle: tokio::runtime::Handle,
}

impl Ctx {
    /// Runs a request off the UI thread; the acknowledgment (or an
    /// action-specific failure message) comes back through the channel.
    fn dispatch<F>(&self, error_message: &'static str, fut: F)
    where
        F: Future<Output = eyre::Result<Action>> + Send + 'static,
    {
        let tx = self.tx.clone();

        self.handle.spawn(async move {
            let action = fut.await.unwrap_or_else(|_| Action::Failed(error_message));
            let _ = tx.send(action);
        });
    }

    fn fetch_todos(&self) {
        let api = self.api.clone();

        self.dispatch(
            "Failed to load todos. Please check if the server is running.",
            async move { Ok(Action::Todos(api.get_todos().await?)) },
        );
    }

    // An unreachable server shows up as "disconnected", not as an error
    // banner. A healthy check also refreshes the store statistics.
    fn check_health(&self) {
        let api = self.api.clone();
        let tx = self.tx.clone();

        self.handle.spawn(async move {
            let database = match api.health().await {
                Ok(health) => health.database,
                Err(_) => String::from("disconnected"),
            };

            let connected = database == "connected";
            let _ = tx.send(Action::Health(database));

            if connected {
                if let Ok(info) = api.db_info().await {
                    let _ = tx.send(Action::DbInfo(info));
                }
            }
        });
    }

    fn create_todo(&self, title: String) {
        let api = self.api.clone();

        self.dispatch("Failed to add todo. Please try again.", async move {
            let body = CreateTodo {
                title: Some(title),
                ..CreateTodo::default()
            };

            Ok(Action::Created(api.create_todo(&body).await?))
        });
    }

    fn rename_todo(&self, id: String, title: String) {
        let api = self.api.clone();

        self.dispatch("Failed to update todo. Please try again.", async move {
            let body = UpdateTodo {
                title: Some(title),
                ..UpdateTodo::default()
            };

            Ok(Action::Updated(api.update_todo(&id, &body).await?))
        });
    }

    fn toggle_todo(&self, id: String) {
        let api = self.api.clone();

        self.dispatch("Failed to update todo. Please try again.", async move {
            Ok(Action::Updated(api.toggle_todo(&id).await?))
        });
    }

    fn delete_todo(&self, id: String) {
        let api = self.api.clone();

        self.dispatch("Failed to delete todo. Please try again.", async move {
            Ok(Action::Deleted(api.delete_todo(&id).await?.todo.id))
        });
    }
}

fn handle_key(app: &mut App, ctx: &Ctx, key: KeyEvent) {
    match &mut app.mode {
        Mode::Normal => match key.code {
            KeyCode::Char('q') => app.quit = true,
            KeyCode::Char('x') => app.error = None,
            KeyCode::Char('r') => ctx.fetch_todos(),
            KeyCode::Char('a') | KeyCode::Char('i') => {
                app.input.clear();
                app.mode = Mode::Input;
            }
            KeyCode::Up | KeyCode::Char('k') => app.selected = app.selected.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                if app.selected + 1 < app.todos.len() {
                    app.selected += 1;
                }
            }
            KeyCode::Char(' ') | KeyCode::Enter => {
                if let Some(todo) = app.selected_todo() {
                    ctx.toggle_todo(todo.id.clone());
                }
            }
            KeyCode::Char('e') => {
                if let Some(todo) = app.selected_todo() {
                    app.mode = Mode::Edit {
                        id: todo.id.clone(),
                        draft: todo.title.clone(),
                    };
                }
            }
            KeyCode::Char('d') => {
                if let Some(todo) = app.selected_todo() {
                    app.mode = Mode::ConfirmDelete {
                        id: todo.id.clone(),
                    };
                }
            }
            _ => {}
        },
        Mode::Input => match key.code {
            KeyCode::Enter => {
                let title = app.input.trim().to_owned();

                if !title.is_empty() {
                    ctx.create_todo(title);
                }

                app.input.clear();
                app.mode = Mode::Normal;
            }
            KeyCode::Esc => {
                app.input.clear();
                app.mode = Mode::Normal;
            }
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Char(c) => app.input.push(c),
            _ => {}
        },
        Mode::Edit { id, draft } => match key.code {
            KeyCode::Enter => {
                let title = draft.trim().to_owned();
                let id = id.clone();
                app.mode = Mode::Normal;

                if !title.is_empty() {
                    ctx.rename_todo(id, title);
                }
            }
            KeyCode::Esc => app.mode = Mode::Normal,
            KeyCode::Backspace => {
                draft.pop();
            }
            KeyCode::Char(c) => draft.push(c),
            _ => {}
        },
        Mode::ConfirmDelete { id } => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => {
                let id = id.clone();
                app.mode = Mode::Normal;
                ctx.delete_todo(id);
            }
            _ => app.mode = Mode::Normal,
        },
    }
}
