//! Lifecycle-managed applications of the notes service.

use std::sync::atomic::{AtomicUsize, Ordering};

use faster_app::prelude::*;

use crate::notes::NOTES;

/// Seeds the note collection and reports its size.
#[derive(Debug, Default)]
pub struct NoteStore {
    seeded: AtomicUsize,
}

#[async_trait]
impl AppLifecycle for NoteStore {
    fn name(&self) -> &str {
        "notes.store"
    }

    async fn on_startup(&self) -> AppResult<()> {
        if !NOTES.is_empty().await {
            return Ok(());
        }
        let welcome = [
            ("Welcome", "Create notes with POST /notes and a bearer token."),
            ("Searching", "Try GET /notes?search=welcome&ordering=title."),
        ];
        for (title, body) in welcome {
            let mut fields = Fields::new();
            fields.insert("title".to_string(), json!(title));
            fields.insert("body".to_string(), json!(body));
            fields.insert("owner_id".to_string(), json!("system"));
            NOTES.create(fields).await?;
        }
        self.seeded.store(welcome.len(), Ordering::Relaxed);
        tracing::info!(count = welcome.len(), "seeded notes");
        Ok(())
    }

    async fn health_check(&self) -> AppResult<Value> {
        Ok(json!({
            "status": "healthy",
            "notes": NOTES.len().await,
            "seeded": self.seeded.load(Ordering::Relaxed),
        }))
    }
}

/// Pretend outbound mail relay; needs the store to be up first.
#[derive(Debug, Default)]
pub struct Mailer;

#[async_trait]
impl AppLifecycle for Mailer {
    fn name(&self) -> &str {
        "notes.mailer"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["notes.store".to_string()]
    }

    async fn on_startup(&self) -> AppResult<()> {
        tracing::info!("mail relay connected");
        Ok(())
    }

    async fn on_shutdown(&self) -> AppResult<()> {
        tracing::info!("mail relay disconnected");
        Ok(())
    }
}

/// The registry with every application of the service.
pub fn registry() -> AppResult<AppRegistry> {
    let mut registry = AppRegistry::new();
    registry.register(Arc::new(Mailer))?;
    registry.register(Arc::new(NoteStore::default()))?;
    Ok(registry)
}
