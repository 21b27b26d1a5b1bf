use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use futures::TryStreamExt;
use mongodb::{options::ReturnDocument, Collection, Database};
use serde::{Deserialize, Serialize};
use tally_api::v1::{CreateTodo, DbInfo, DbStats, Priority, Todo, UpdateTodo};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),
    #[error("Todo not found")]
    NotFound,
    #[error("Invalid todo id")]
    InvalidId,
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
}

/// The sole reader/writer of the todo collection. The router talks to this
/// trait so tests can swap the database out for an in-memory map.
#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Todo>, StoreError>;
    async fn get(&self, id: &str) -> Result<Todo, StoreError>;
    async fn create(&self, fields: CreateTodo) -> Result<Todo, StoreError>;
    async fn update(&self, id: &str, fields: UpdateTodo) -> Result<Todo, StoreError>;
    async fn toggle_completed(&self, id: &str) -> Result<Todo, StoreError>;
    async fn delete(&self, id: &str) -> Result<Todo, StoreError>;
    async fn info(&self) -> Result<DbInfo, StoreError>;
}

/// Stored shape of a todo. Field names match the wire shape so the same
/// camelCase keys appear in the collection and in responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TodoDocument {
    #[serde(rename = "_id")]
    id: ObjectId,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    completed: bool,
    priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<BsonDateTime>,
    created_at: BsonDateTime,
    updated_at: BsonDateTime,
}

impl From<TodoDocument> for Todo {
    fn from(doc: TodoDocument) -> Self {
        Todo {
            id: doc.id.to_hex(),
            title: doc.title,
            description: doc.description,
            completed: doc.completed,
            priority: doc.priority,
            due_date: doc.due_date.map(BsonDateTime::to_chrono),
            created_at: doc.created_at.to_chrono(),
            updated_at: doc.updated_at.to_chrono(),
        }
    }
}

pub struct MongoStore {
    db: Database,
    todos: Collection<TodoDocument>,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        let todos = db.collection("todos");
        Self { db, todos }
    }
}

fn parse_id(id: &str) -> Result<ObjectId, StoreError> {
    ObjectId::parse_str(id).map_err(|_| StoreError::InvalidId)
}

fn validate_title(raw: Option<&str>) -> Result<String, StoreError> {
    let title = raw.map(str::trim).unwrap_or_default();

    if title.is_empty() {
        return Err(StoreError::Validation(String::from("Title is required")));
    }

    Ok(title.to_owned())
}

fn stat(stats: &Document, key: &str) -> u64 {
    match stats.get(key) {
        Some(Bson::Int32(n)) => *n as u64,
        Some(Bson::Int64(n)) => *n as u64,
        Some(Bson::Double(n)) => *n as u64,
        _ => 0,
    }
}

#[async_trait]
impl TodoStore for MongoStore {
    async fn list(&self) -> Result<Vec<Todo>, StoreError> {
        let cursor = self
            .todos
            .find(doc! {})
            .sort(doc! { "createdAt": -1 })
            .await?;

        let docs: Vec<TodoDocument> = cursor.try_collect().await?;
        Ok(docs.into_iter().map(Todo::from).collect())
    }

    async fn get(&self, id: &str) -> Result<Todo, StoreError> {
        let oid = parse_id(id)?;

        let doc = self.todos.find_one(doc! { "_id": oid }).await?;
        doc.map(Todo::from).ok_or(StoreError::NotFound)
    }

    async fn create(&self, fields: CreateTodo) -> Result<Todo, StoreError> {
        let title = validate_title(fields.title.as_deref())?;
        let now = BsonDateTime::now();

        let doc = TodoDocument {
            id: ObjectId::new(),
            title,
            description: fields.description.map(|d| d.trim().to_owned()),
            completed: false,
            priority: fields.priority.unwrap_or_default(),
            due_date: fields.due_date.map(BsonDateTime::from_chrono),
            created_at: now,
            updated_at: now,
        };

        self.todos.insert_one(&doc).await?;

        Ok(doc.into())
    }

    async fn update(&self, id: &str, fields: UpdateTodo) -> Result<Todo, StoreError> {
        let oid = parse_id(id)?;

        // Partial merge: only fields present in the request are written.
        let mut set = Document::new();

        if let Some(title) = fields.title.as_deref() {
            set.insert("title", validate_title(Some(title))?);
        }
        if let Some(description) = fields.description {
            set.insert("description", description.trim());
        }
        if let Some(completed) = fields.completed {
            set.insert("completed", completed);
        }
        if let Some(priority) = fields.priority {
            set.insert("priority", priority.as_str());
        }
        if let Some(due) = fields.due_date {
            set.insert("dueDate", BsonDateTime::from_chrono(due));
        }
        set.insert("updatedAt", BsonDateTime::now());

        let updated = self
            .todos
            .find_one_and_update(doc! { "_id": oid }, doc! { "$set": set })
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(updated.into())
    }

    async fn toggle_completed(&self, id: &str) -> Result<Todo, StoreError> {
        let oid = parse_id(id)?;

        let current = self
            .todos
            .find_one(doc! { "_id": oid })
            .await?
            .ok_or(StoreError::NotFound)?;

        let updated = self
            .todos
            .find_one_and_update(
                doc! { "_id": oid },
                doc! { "$set": {
                    "completed": !current.completed,
                    "updatedAt": BsonDateTime::now(),
                } },
            )
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(updated.into())
    }

    async fn delete(&self, id: &str) -> Result<Todo, StoreError> {
        let oid = parse_id(id)?;

        let deleted = self
            .todos
            .find_one_and_delete(doc! { "_id": oid })
            .await?
            .ok_or(StoreError::NotFound)?;

        Ok(deleted.into())
    }

    async fn info(&self) -> Result<DbInfo, StoreError> {
        let collections = self.db.list_collection_names().await?;
        let stats = self.db.run_command(doc! { "dbStats": 1 }).await?;

        Ok(DbInfo {
            database: self.db.name().to_owned(),
            collections,
            stats: DbStats {
                collections: stat(&stats, "collections"),
                objects: stat(&stats, "objects"),
                data_size: stat(&stats, "dataSize"),
                storage_size: stat(&stats, "storageSize"),
            },
        })
    }
}
