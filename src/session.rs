// src/session.rs

use crate::errors::StudioError;
use crate::layout::{LayoutConfirmation, LayoutEditor, compose_final_prompt};
use crate::models::{ArtDirectionRequest, AspectRatio, DesignDna, NewDesignDna};
use crate::services::{DesignStore, GenerationJob, GenerativeClient};
use crate::studio::{GenerateRequest, Orchestrator};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Scheduled expiry that restarts on every [`IdleTimer::touch`]. The task is
/// aborted when the timer is dropped.
#[derive(Debug)]
pub struct IdleTimer {
    activity: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl IdleTimer {
    pub fn start(timeout: Duration, on_expire: impl FnOnce() + Send + 'static) -> Self {
        let activity = Arc::new(Notify::new());
        let signal = activity.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => break,
                    _ = signal.notified() => {}
                }
            }
            on_expire();
        });
        Self { activity, handle }
    }

    pub fn touch(&self) {
        self.activity.notify_one();
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub history_limit: usize,
    pub mask_width: u32,
}

/// Mask and description handed over by "confirm layout".
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedLayout {
    pub mask: String,
    pub description: String,
}

/// Options of one generate submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateOptions {
    pub append: bool,
    pub prompt: Option<String>,
    pub aspect_ratio: Option<AspectRatio>,
    pub use_layout: bool,
}

pub struct Session {
    pub id: Uuid,
    pub author: String,
    pub studio: Orchestrator,
    pub brief: Mutex<ArtDirectionRequest>,
    pub editor: Mutex<Option<LayoutEditor>>,
    pub confirmed_layout: Mutex<Option<ConfirmedLayout>>,
    /// The design list as displayed; only changed after the store confirms.
    pub designs: Mutex<Vec<DesignDna>>,
    settings: SessionSettings,
    timer: Option<IdleTimer>,
}

impl Session {
    fn new(
        author: String,
        client: Arc<dyn GenerativeClient>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            author,
            studio: Orchestrator::new(client),
            brief: Mutex::new(ArtDirectionRequest::default()),
            editor: Mutex::new(None),
            confirmed_layout: Mutex::new(None),
            designs: Mutex::new(Vec::new()),
            settings,
            timer: None,
        }
    }

    pub fn touch(&self) {
        if let Some(timer) = &self.timer {
            timer.touch();
        }
    }

    /// "New brief": wholesale reset of the brief, results and layout.
    pub async fn reset_brief(&self) {
        let mut editor = self.editor.lock().await;
        *self.brief.lock().await = ArtDirectionRequest::default();
        self.studio.reset().await;
        *editor = None;
        *self.confirmed_layout.lock().await = None;
    }

    /// Analyzes the current brief and opens the layout editor on success.
    pub async fn analyze(&self) -> Result<bool, StudioError> {
        let brief = self.brief.lock().await.clone();
        *self.confirmed_layout.lock().await = None;
        let Some((ticket, analysis)) = self.studio.analyze(&brief).await? else {
            return Ok(false);
        };
        // Editor lock before the studio state, as in `reset_brief`.
        let mut editor = self.editor.lock().await;
        if !self.studio.analysis_is_current(ticket).await {
            debug!("Analysis superseded before the layout editor opened");
            return Ok(false);
        }
        *editor = Some(LayoutEditor::new(
            analysis.layout_suggestion,
            self.settings.history_limit,
        ));
        Ok(true)
    }

    pub async fn confirm_layout(&self) -> Result<ConfirmedLayout, StudioError> {
        let mask_width = self.settings.mask_width;
        let confirmation: LayoutConfirmation =
            self.edit_layout(|editor| Ok(editor.confirm(mask_width))).await?;
        let confirmed = ConfirmedLayout {
            mask: confirmation.mask.to_data_url()?,
            description: confirmation.description,
        };
        *self.confirmed_layout.lock().await = Some(confirmed.clone());
        Ok(confirmed)
    }

    /// Runs `edit` against the live layout editor.
    pub async fn edit_layout<R>(
        &self,
        edit: impl FnOnce(&mut LayoutEditor) -> Result<R, StudioError>,
    ) -> Result<R, StudioError> {
        let mut editor = self.editor.lock().await;
        let editor = editor.as_mut().ok_or_else(|| {
            StudioError::InvalidState("Analyze the brief to get a layout first".to_string())
        })?;
        edit(editor)
    }

    pub async fn generate(&self, options: GenerateOptions) -> Result<bool, StudioError> {
        let brief = self.brief.lock().await.clone();
        let state = self.studio.snapshot().await;
        let analysis = state.analysis.data.as_ref();

        let base_prompt = match (&options.prompt, analysis) {
            (Some(prompt), _) if !prompt.trim().is_empty() => prompt.clone(),
            (_, Some(analysis)) => analysis.final_prompt.clone(),
            _ => {
                return Err(StudioError::InvalidState(
                    "Analyze the brief or provide a prompt first".to_string(),
                ));
            }
        };
        let layout = if options.use_layout {
            self.confirmed_layout.lock().await.clone()
        } else {
            None
        };
        let prompt = match &layout {
            Some(layout) => compose_final_prompt(&base_prompt, &layout.description),
            None => base_prompt,
        };
        let aspect_ratio = options
            .aspect_ratio
            .or(analysis.map(|a| a.recommended_aspect_ratio))
            .unwrap_or_else(|| brief.suggested_aspect_ratio());

        let request = GenerateRequest {
            job: GenerationJob {
                prompt,
                aspect_ratio,
                quality: brief.quality,
                mask: layout.map(|l| l.mask),
                reference_images: brief
                    .logo_image
                    .iter()
                    .chain(brief.asset_images.iter())
                    .cloned()
                    .collect(),
            },
            batch_size: brief.effective_batch_size(),
            append: options.append,
        };
        Ok(self.studio.generate_images(request).await)
    }

    /// Aspect ratio used for follow-up edits of generated images.
    pub async fn working_aspect_ratio(&self) -> AspectRatio {
        match self.studio.snapshot().await.analysis.data {
            Some(analysis) => analysis.recommended_aspect_ratio,
            None => self.brief.lock().await.suggested_aspect_ratio(),
        }
    }

    pub async fn save_design(
        &self,
        store: &dyn DesignStore,
        thumbnail: String,
        seed: Option<i64>,
    ) -> Result<DesignDna, StudioError> {
        if thumbnail.trim().is_empty() {
            return Err(StudioError::Validation(
                "A thumbnail is required to save a design".to_string(),
            ));
        }
        let state = self.studio.snapshot().await;
        let request_data = self.brief.lock().await.clone();
        let recommended_aspect_ratio = self.working_aspect_ratio().await;
        let design = NewDesignDna {
            thumbnail,
            request_data,
            design_plan: state.plan().cloned(),
            recommended_aspect_ratio,
            author: self.author.clone(),
            created_at: chrono::Utc::now(),
            seed,
        };
        let saved = store.save(design).await?;
        info!("Saved design {} for {}", saved.id, self.author);
        self.designs.lock().await.insert(0, saved.clone());
        Ok(saved)
    }

    pub async fn refresh_designs(&self, store: &dyn DesignStore) -> Result<Vec<DesignDna>, StudioError> {
        let designs = store.list_by_author(&self.author).await?;
        *self.designs.lock().await = designs.clone();
        Ok(designs)
    }

    pub async fn delete_design(&self, store: &dyn DesignStore, id: u64) -> Result<(), StudioError> {
        store.delete(id, &self.author).await?;
        self.designs.lock().await.retain(|d| d.id != id);
        Ok(())
    }

    pub async fn delete_all_designs(&self, store: &dyn DesignStore) -> Result<usize, StudioError> {
        let removed = store.delete_by_author(&self.author).await?;
        self.designs.lock().await.clear();
        Ok(removed)
    }
}

type SessionMap = Arc<Mutex<HashMap<Uuid, Arc<Session>>>>;

pub struct SessionManager {
    sessions: SessionMap,
    idle_timeout: Duration,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration, settings: SessionSettings) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
            settings,
        }
    }

    pub async fn open(
        &self,
        author: &str,
        client: Arc<dyn GenerativeClient>,
    ) -> Result<Arc<Session>, StudioError> {
        let author = author.trim();
        if author.is_empty() {
            return Err(StudioError::Validation("A display name is required".to_string()));
        }
        let mut session = Session::new(author.to_string(), client, self.settings);
        let id = session.id;

        let registry: Weak<Mutex<HashMap<Uuid, Arc<Session>>>> = Arc::downgrade(&self.sessions);
        session.timer = Some(IdleTimer::start(self.idle_timeout, move || {
            tokio::spawn(async move {
                if let Some(registry) = registry.upgrade() {
                    if registry.lock().await.remove(&id).is_some() {
                        info!("Session {} expired after inactivity", id);
                    }
                }
            });
        }));

        let session = Arc::new(session);
        self.sessions.lock().await.insert(id, session.clone());
        info!("Opened session {} for {}", id, author);
        Ok(session)
    }

    /// Looks up a live session and counts the lookup as activity.
    pub async fn get(&self, id: &Uuid) -> Result<Arc<Session>, StudioError> {
        let session = self
            .sessions
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StudioError::Unauthorized("Session expired, please log in again".to_string()))?;
        session.touch();
        Ok(session)
    }

    pub async fn close(&self, id: &Uuid) -> bool {
        let removed = self.sessions.lock().await.remove(id).is_some();
        if removed {
            info!("Closed session {}", id);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ContainerSize, DragMode, PointerPosition};
    use crate::services::memory_store::MemoryDesignStore;
    use crate::studio::tests::FakeClient;
    use std::sync::atomic::{AtomicBool, Ordering};

    const SETTINGS: SessionSettings = SessionSettings {
        history_limit: 20,
        mask_width: 64,
    };

    fn manager(idle: Duration) -> SessionManager {
        SessionManager::new(idle, SETTINGS)
    }

    async fn analyzed_session(manager: &SessionManager) -> Arc<Session> {
        let session = manager
            .open("Linh", Arc::new(FakeClient::default()))
            .await
            .unwrap();
        session.brief.lock().await.main_headline = "Run faster".to_string();
        assert!(session.analyze().await.unwrap());
        session
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timer_fires_after_timeout() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let timer = IdleTimer::start(Duration::from_secs(10), move || flag.store(true, Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(6)).await;
        timer.touch();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_timer_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let timer = IdleTimer::start(Duration::from_secs(1), move || flag.store(true, Ordering::SeqCst));
        drop(timer);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_is_removed() {
        let manager = manager(Duration::from_secs(30));
        let session = manager.open("Linh", Arc::new(FakeClient::default())).await.unwrap();
        let id = session.id;
        drop(session);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(manager.get(&id).await.is_ok());
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(manager.get(&id).await.is_ok());
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(matches!(
            manager.get(&id).await,
            Err(StudioError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn logout_removes_session() {
        let manager = manager(Duration::from_secs(60));
        let session = manager.open("Linh", Arc::new(FakeClient::default())).await.unwrap();
        assert!(manager.close(&session.id).await);
        assert!(!manager.close(&session.id).await);
        assert_eq!(manager.len().await, 0);
    }

    #[tokio::test]
    async fn blank_author_is_refused() {
        let manager = manager(Duration::from_secs(60));
        assert!(manager.open("  ", Arc::new(FakeClient::default())).await.is_err());
    }

    #[tokio::test]
    async fn analysis_opens_editor_and_layout_feeds_generation() {
        let manager = manager(Duration::from_secs(60));
        let session = analyzed_session(&manager).await;
        {
            let mut editor = session.editor.lock().await;
            let editor = editor.as_mut().unwrap();
            let container = ContainerSize { width: 100.0, height: 100.0 };
            editor
                .pointer_down("hero", DragMode::Move, PointerPosition { x: 0.0, y: 0.0 }, container)
                .unwrap();
            editor.pointer_move(PointerPosition { x: 10.0, y: 0.0 });
            assert!(editor.pointer_up());
            assert_eq!(editor.elements()[0].rect.x, 30.0);
        }
        let confirmed = session.confirm_layout().await.unwrap();
        assert!(confirmed.mask.starts_with("data:image/png;base64,"));
        assert!(confirmed.description.contains("x 30%"));

        let generated = session
            .generate(GenerateOptions {
                use_layout: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(generated);
        let state = session.studio.snapshot().await;
        assert_eq!(state.images.data.len(), 1);
        assert!(state.images.data[0].url.contains("Layout guide"));
    }

    #[tokio::test]
    async fn generation_needs_a_prompt() {
        let manager = manager(Duration::from_secs(60));
        let session = manager.open("Linh", Arc::new(FakeClient::default())).await.unwrap();
        assert!(matches!(
            session.generate(GenerateOptions::default()).await,
            Err(StudioError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn new_brief_resets_everything() {
        let manager = manager(Duration::from_secs(60));
        let session = analyzed_session(&manager).await;
        session.reset_brief().await;
        assert!(session.editor.lock().await.is_none());
        assert!(session.brief.lock().await.main_headline.is_empty());
        assert!(session.studio.snapshot().await.plan().is_none());
    }

    #[tokio::test]
    async fn reset_during_analysis_keeps_editor_closed() {
        let manager = manager(Duration::from_secs(60));
        let session = manager.open("Linh", Arc::new(FakeClient::default())).await.unwrap();
        session.brief.lock().await.main_headline = "Run faster".to_string();

        let editor = session.editor.lock().await;
        let running = session.clone();
        let analysis = tokio::spawn(async move { running.analyze().await });
        for _ in 0..100 {
            if session.studio.snapshot().await.plan().is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(session.studio.snapshot().await.plan().is_some());

        session.studio.reset().await;
        drop(editor);
        assert!(!analysis.await.unwrap().unwrap());
        assert!(session.editor.lock().await.is_none());
    }

    #[tokio::test]
    async fn designs_are_saved_listed_and_deleted() {
        let manager = manager(Duration::from_secs(60));
        let session = analyzed_session(&manager).await;
        let store = MemoryDesignStore::default();

        let first = session.save_design(&store, "thumb-1".to_string(), None).await.unwrap();
        let second = session.save_design(&store, "thumb-2".to_string(), Some(7)).await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(second.design_plan.as_ref().unwrap().subject, "Sneaker");
        assert_eq!(second.recommended_aspect_ratio, AspectRatio::Wide);

        let listed = session.refresh_designs(&store).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at >= listed[1].created_at);

        session.delete_design(&store, first.id).await.unwrap();
        assert_eq!(session.designs.lock().await.len(), 1);
        assert_eq!(session.delete_all_designs(&store).await.unwrap(), 1);
        assert!(session.designs.lock().await.is_empty());
    }

    #[tokio::test]
    async fn designs_of_another_author_cannot_be_deleted() {
        let manager = manager(Duration::from_secs(60));
        let linh = analyzed_session(&manager).await;
        let minh = manager
            .open("Minh", Arc::new(FakeClient::default()))
            .await
            .unwrap();
        let store = MemoryDesignStore::default();
        let saved = linh.save_design(&store, "thumb".to_string(), None).await.unwrap();

        assert!(matches!(
            minh.delete_design(&store, saved.id).await,
            Err(StudioError::NotFound(_))
        ));
        assert_eq!(linh.refresh_designs(&store).await.unwrap().len(), 1);

        linh.delete_design(&store, saved.id).await.unwrap();
        assert!(linh.refresh_designs(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_leaves_displayed_list_untouched() {
        let manager = manager(Duration::from_secs(60));
        let session = analyzed_session(&manager).await;
        let store = MemoryDesignStore::default();
        let saved = session.save_design(&store, "thumb".to_string(), None).await.unwrap();

        store.set_failing(true);
        assert!(matches!(
            session.delete_design(&store, saved.id).await,
            Err(StudioError::Redis(_))
        ));
        assert!(session.delete_all_designs(&store).await.is_err());
        assert!(session.save_design(&store, "other".to_string(), None).await.is_err());
        assert_eq!(session.designs.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn empty_thumbnail_is_rejected() {
        let manager = manager(Duration::from_secs(60));
        let session = analyzed_session(&manager).await;
        let store = MemoryDesignStore::default();
        assert!(matches!(
            session.save_design(&store, " ".to_string(), None).await,
            Err(StudioError::Validation(_))
        ));
    }
}
