//! The notes resource.

use faster_app::auth::permissions::owner_of;
use faster_app::axum::http::{Method, StatusCode};
use faster_app::prelude::*;
use faster_app::views::tasks::spawn_background;
use once_cell::sync::Lazy;

/// Process-wide note storage, shared with the [`crate::services::NoteStore`] app.
pub static NOTES: Lazy<Arc<MemoryCollection>> =
    Lazy::new(|| Arc::new(MemoryCollection::new("notes").with_timestamps()));

#[derive(Debug, Serialize, Deserialize)]
pub struct NoteOut {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

impl ReadRepresentation for NoteOut {}

#[derive(Debug, Serialize, Deserialize)]
pub struct NoteIn {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tag: Option<String>,
}

impl WriteRepresentation for NoteIn {
    fn validate(&self) -> AppResult<()> {
        validate_title(Some(&self.title))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotePatch {
    pub title: Option<String>,
    pub body: Option<String>,
    pub tag: Option<String>,
}

impl WriteRepresentation for NotePatch {
    fn validate(&self) -> AppResult<()> {
        validate_title(self.title.as_deref())
    }
}

fn validate_title(title: Option<&str>) -> AppResult<()> {
    match title {
        Some(t) if t.trim().is_empty() => Err(AppError::ValidationFailed(
            ValidationError::new("Invalid input", "invalid")
                .with_field_error("title", ValidationError::new("This field may not be blank.", "blank")),
        )),
        Some(t) if t.chars().count() > 200 => Err(AppError::ValidationFailed(
            ValidationError::new("Invalid input", "invalid").with_field_error(
                "title",
                ValidationError::new("Ensure this field has no more than 200 characters.", "max_length"),
            ),
        )),
        _ => Ok(()),
    }
}

/// `/notes`: anyone reads, authors write their own notes.
#[derive(Default)]
pub struct NoteViewSet;

#[async_trait]
impl ViewSet for NoteViewSet {
    type Read = NoteOut;
    type Create = NoteIn;
    type Update = NotePatch;

    fn resource() -> Resource {
        let notes: Arc<dyn Collection> = Arc::<MemoryCollection>::clone(&NOTES);
        Resource::new(notes)
            .authentication::<JwtAuthentication>()
            .permission::<IsOwnerOrReadOnly>()
            .throttle(Arc::new(AnonRateThrottle::default()))
            .throttle(Arc::new(ScopedRateThrottle::default()))
            .throttle_scope("notes")
            .filter_backend::<FieldFilter>()
            .filter_backend::<SearchFilter>()
            .filter_backend::<OrderingFilter>()
            .filter_field("tag", FilterKind::Exact)
            .search_fields(["title", "body"])
            .ordering_fields(["title", "created_at"])
            .ordering(["-created_at"])
    }

    fn actions() -> Vec<Action<Self>> {
        vec![
            Action::new("mine")
                .summary("Notes written by the caller")
                .handler(|view: Self, req: ActionRequest| async move {
                    let me = req
                        .ctx
                        .identity
                        .as_ref()
                        .map(|i| i.id.clone())
                        .ok_or_else(|| AppError::unauthorized("Authentication credentials were not provided."))?;
                    let queryset = view.get_queryset(&req.ctx, &req.resource).await?;
                    let rows = queryset.filter(Q::eq("owner_id", me.as_str())).fetch().await?;
                    let mut items = Vec::with_capacity(rows.len());
                    for row in &rows {
                        items.push(NoteOut::render(row).await?);
                    }
                    Ok(ApiResponse::success(json!({ "items": items, "total": items.len() })))
                }),
            Action::new("archive")
                .methods([Method::POST])
                .detail(true)
                .summary("Mark a note archived")
                .handler(|_view: Self, mut req: ActionRequest| async move {
                    let mut note = req.take_object()?;
                    let mut change = Fields::new();
                    change.insert("archived".to_string(), Value::Bool(true));
                    note.apply(change);
                    req.resource.collection.save(&note).await?;
                    Ok(ApiResponse::success_with(
                        NoteOut::render(&note).await?,
                        "Archived",
                        StatusCode::OK,
                    ))
                }),
        ]
    }

    async fn perform_create_hook(&self, ctx: &RequestContext, mut fields: Fields) -> AppResult<Fields> {
        let identity = ctx
            .identity
            .as_ref()
            .ok_or_else(|| AppError::unauthorized("Authentication credentials were not provided."))?;
        fields.insert("owner_id".to_string(), Value::String(identity.id.clone()));
        Ok(fields)
    }

    async fn perform_create_after_hook(&self, _ctx: &RequestContext, record: Record) -> AppResult<Record> {
        let title = record.get_text("title").unwrap_or_default();
        let owner = owner_of(&record).unwrap_or_default();
        spawn_background("notify-followers", async move {
            tracing::info!(%owner, %title, "notifying followers of new note");
            Ok(())
        });
        Ok(record)
    }

    async fn perform_destroy_hook(&self, _ctx: &RequestContext, instance: &Record) -> AppResult<bool> {
        // Archived notes are kept for the audit trail.
        Ok(instance.get("archived") != Some(&Value::Bool(true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faster_app::auth::authentication::codec_from_settings;
    use faster_app::test::TestClient;

    fn client() -> TestClient {
        let router = FasterApp::new(Settings::default())
            .router(NoteViewSet::router("/notes"))
            .build()
            .unwrap();
        TestClient::new(router).with_client_addr("127.0.0.9:1".parse().unwrap())
    }

    fn token(user: &str) -> String {
        codec_from_settings(SETTINGS.get()).issue(user, Value::Null, 5).unwrap()
    }

    #[tokio::test]
    async fn test_note_lifecycle() {
        let author = client().with_bearer(&token("ada"));
        let resp = author.post_json("/notes", &json!({ "title": "Demo", "tag": "x" })).await;
        assert_eq!(resp.status_code(), 201, "{}", resp.text());
        assert_eq!(resp.data()["owner_id"], "ada");
        let id = resp.data()["id"].as_str().unwrap().to_string();

        let mine = author.get("/notes/mine").await;
        assert!(mine.data()["total"].as_u64().unwrap() >= 1);

        let resp = author
            .send(Method::POST, &format!("/notes/{id}/archive"), None)
            .await;
        assert_eq!(resp.envelope().message, "Archived");
        assert_eq!(author.delete(&format!("/notes/{id}")).await.status_code(), 404);
    }

    #[tokio::test]
    async fn test_blank_title_rejected() {
        let author = client().with_bearer(&token("grace"));
        let resp = author.post_json("/notes", &json!({ "title": " " })).await;
        assert_eq!(resp.status_code(), 400);
    }
}
