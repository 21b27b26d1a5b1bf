use tally_api::v1::{DbInfo, Todo};

#[derive(Debug)]
pub enum Mode {
    Normal,
    Input,
    Edit { id: String, draft: String },
    ConfirmDelete { id: String },
}

/// A server acknowledgment (or failure) for one request, keyed by entity id
/// where relevant.
#[derive(Debug)]
pub enum Action {
    Todos(Vec<Todo>),
    Created(Todo),
    Updated(Todo),
    Deleted(String),
    Health(String),
    DbInfo(DbInfo),
    Failed(&'static str),
}

pub struct App {
    pub todos: Vec<Todo>,
    pub selected: usize,
    pub mode: Mode,
    pub input: String,
    pub server_status: String,
    pub db_info: Option<DbInfo>,
    pub error: Option<&'static str>,
    pub quit: bool,
}

impl App {
    pub fn new() -> Self {
        Self {
            todos: Vec::new(),
            selected: 0,
            mode: Mode::Normal,
            input: String::new(),
            server_status: String::from("checking"),
            db_info: None,
            error: None,
            quit: false,
        }
    }

    pub fn selected_todo(&self) -> Option<&Todo> {
        self.todos.get(self.selected)
    }

    /// State transitions apply only after the server has acknowledged; a
    /// failed call leaves the list untouched and raises the banner.
    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Todos(todos) => {
                self.todos = todos;
                self.clamp_selection();
            }
            Action::Created(todo) => {
                // The server orders by creation time descending, so the new
                // entry belongs at the top.
                self.todos.insert(0, todo);
            }
            Action::Updated(todo) => {
                if let Some(slot) = self.todos.iter_mut().find(|t| t.id == todo.id) {
                    *slot = todo;
                }
            }
            Action::Deleted(id) => {
                self.todos.retain(|t| t.id != id);
                self.clamp_selection();
            }
            Action::Health(database) => self.server_status = database,
            Action::DbInfo(info) => self.db_info = Some(info),
            Action::Failed(message) => self.error = Some(message),
        }
    }

    fn clamp_selection(&mut self) {
        if self.selected >= self.todos.len() {
            self.selected = self.todos.len().saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tally_api::v1::Priority;

    use super::*;

    fn todo(id: &str, title: &str) -> Todo {
        let now = Utc::now();

        Todo {
            id: id.into(),
            title: title.into(),
            description: None,
            completed: false,
            priority: Priority::Medium,
            due_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn created_todos_are_prepended() {
        let mut app = App::new();
        app.apply(Action::Todos(vec![todo("a", "first")]));

        app.apply(Action::Created(todo("b", "second")));

        assert_eq!(app.todos[0].id, "b");
        assert_eq!(app.todos[1].id, "a");
    }

    #[test]
    fn updates_replace_the_entry_with_the_matching_id() {
        let mut app = App::new();
        app.apply(Action::Todos(vec![todo("a", "first"), todo("b", "second")]));

        let mut toggled = todo("b", "second");
        toggled.completed = true;
        app.apply(Action::Updated(toggled));

        assert!(!app.todos[0].completed);
        assert!(app.todos[1].completed);
        assert_eq!(app.todos.len(), 2);
    }

    #[test]
    fn updates_for_unknown_ids_are_ignored() {
        let mut app = App::new();
        app.apply(Action::Todos(vec![todo("a", "first")]));

        app.apply(Action::Updated(todo("zzz", "ghost")));

        assert_eq!(app.todos.len(), 1);
        assert_eq!(app.todos[0].id, "a");
    }

    #[test]
    fn deletes_remove_by_id_and_clamp_the_selection() {
        let mut app = App::new();
        app.apply(Action::Todos(vec![todo("a", "first"), todo("b", "second")]));
        app.selected = 1;

        app.apply(Action::Deleted(String::from("b")));

        assert_eq!(app.todos.len(), 1);
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn failures_leave_the_list_intact() {
        let mut app = App::new();
        app.apply(Action::Todos(vec![todo("a", "first")]));

        app.apply(Action::Failed("Failed to add todo. Please try again."));

        assert_eq!(app.todos.len(), 1);
        assert_eq!(app.error, Some("Failed to add todo. Please try again."));
    }

    #[test]
    fn db_info_is_recorded_for_the_status_line() {
        use tally_api::v1::DbStats;

        let mut app = App::new();
        assert!(app.db_info.is_none());

        app.apply(Action::DbInfo(DbInfo {
            database: String::from("tally"),
            collections: vec![String::from("todos")],
            stats: DbStats {
                collections: 1,
                objects: 7,
                data_size: 0,
                storage_size: 0,
            },
        }));

        let info = app.db_info.as_ref().unwrap();
        assert_eq!(info.database, "tally");
        assert_eq!(info.stats.objects, 7);
    }

    #[test]
    fn health_updates_the_server_status() {
        let mut app = App::new();
        assert_eq!(app.server_status, "checking");

        app.apply(Action::Health(String::from("connected")));
        assert_eq!(app.server_status, "connected");

        app.apply(Action::Health(String::from("disconnected")));
        assert_eq!(app.server_status, "disconnected");
    }
}
