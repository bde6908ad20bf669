use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::{
    annotation::{Annotation, AnnotationDraft, AnnotationPatch},
    core::store::{AnnotationStore, StoreError},
    persist::AnnotationBackend,
    types::{AnnotationId, BrushOp, ClassId},
};

use super::events::EditorEvent;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("editor runtime is gone")]
    ChannelClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub command_queue_bound: usize,
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            command_queue_bound: 256,
            event_capacity: 1024,
        }
    }
}

/// Undo/redo availability as seen by the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryStatus {
    pub can_undo: bool,
    pub can_redo: bool,
}

/// Cloneable handle to a spawned [`AnnotationStore`].
///
/// Every mutation is serialized through one task, so concurrent callers see
/// the same order of effects as the event stream.
pub struct EditorHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<EditorEvent>,
}

impl Clone for EditorHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            events_tx: self.events_tx.clone(),
        }
    }
}

type Reply<T> = oneshot::Sender<Result<T, RuntimeError>>;

enum Command {
    Load {
        image_id: String,
        resp: Reply<usize>,
    },
    Create {
        draft: AnnotationDraft,
        resp: Reply<Annotation>,
    },
    Delete {
        id: AnnotationId,
        resp: Reply<bool>,
    },
    Update {
        id: AnnotationId,
        patch: AnnotationPatch,
        resp: Reply<Option<Annotation>>,
    },
    Merge {
        ids: Vec<AnnotationId>,
        class_id: ClassId,
        class_name: String,
        resp: Reply<Option<Annotation>>,
    },
    Brush {
        id: AnnotationId,
        path: Vec<(f64, f64)>,
        radius: f64,
        op: BrushOp,
        resp: Reply<Option<Annotation>>,
    },
    Undo {
        resp: Reply<bool>,
    },
    Redo {
        resp: Reply<bool>,
    },
    Get {
        id: AnnotationId,
        resp: oneshot::Sender<Option<Annotation>>,
    },
    Annotations {
        resp: oneshot::Sender<Vec<Annotation>>,
    },
    History {
        resp: oneshot::Sender<HistoryStatus>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Moves `store` onto a dedicated task and returns the handle that drives it.
pub fn spawn_editor<B>(store: AnnotationStore<B>, config: RuntimeConfig) -> EditorHandle
where
    B: AnnotationBackend + 'static,
{
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<EditorEvent>(config.event_capacity.max(1));
    let events_tx_loop = events_tx.clone();

    tokio::spawn(async move {
        let mut store = store;
        while let Some(cmd) = cmd_rx.recv().await {
            if handle_command(cmd, &mut store, &events_tx_loop).await {
                break;
            }
        }
        log::debug!("runtime: editor loop stopped");
    });

    EditorHandle { cmd_tx, events_tx }
}

impl EditorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.events_tx.subscribe()
    }

    /// Loads `image_id` and returns the number of annotations.
    pub async fn load(&self, image_id: impl Into<String>) -> Result<usize, RuntimeError> {
        let image_id = image_id.into();
        self.request(|resp| Command::Load { image_id, resp }).await?
    }

    pub async fn create(&self, draft: AnnotationDraft) -> Result<Annotation, RuntimeError> {
        self.request(|resp| Command::Create { draft, resp }).await?
    }

    pub async fn delete(&self, id: impl Into<AnnotationId>) -> Result<bool, RuntimeError> {
        let id = id.into();
        self.request(|resp| Command::Delete { id, resp }).await?
    }

    pub async fn update(
        &self,
        id: impl Into<AnnotationId>,
        patch: AnnotationPatch,
    ) -> Result<Option<Annotation>, RuntimeError> {
        let id = id.into();
        self.request(|resp| Command::Update { id, patch, resp })
            .await?
    }

    pub async fn merge(
        &self,
        ids: Vec<AnnotationId>,
        class_id: ClassId,
        class_name: impl Into<String>,
    ) -> Result<Option<Annotation>, RuntimeError> {
        let class_name = class_name.into();
        self.request(|resp| Command::Merge {
            ids,
            class_id,
            class_name,
            resp,
        })
        .await?
    }

    pub async fn apply_brush(
        &self,
        id: impl Into<AnnotationId>,
        path: Vec<(f64, f64)>,
        radius: f64,
        op: BrushOp,
    ) -> Result<Option<Annotation>, RuntimeError> {
        let id = id.into();
        self.request(|resp| Command::Brush {
            id,
            path,
            radius,
            op,
            resp,
        })
        .await?
    }

    pub async fn undo(&self) -> Result<bool, RuntimeError> {
        self.request(|resp| Command::Undo { resp }).await?
    }

    pub async fn redo(&self) -> Result<bool, RuntimeError> {
        self.request(|resp| Command::Redo { resp }).await?
    }

    pub async fn get(&self, id: impl Into<AnnotationId>) -> Result<Option<Annotation>, RuntimeError> {
        let id = id.into();
        self.request(|resp| Command::Get { id, resp }).await
    }

    pub async fn annotations(&self) -> Result<Vec<Annotation>, RuntimeError> {
        self.request(|resp| Command::Annotations { resp }).await
    }

    pub async fn history(&self) -> Result<HistoryStatus, RuntimeError> {
        self.request(|resp| Command::History { resp }).await
    }

    /// Stops the loop after every previously queued command has run.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

async fn handle_command<B: AnnotationBackend>(
    cmd: Command,
    store: &mut AnnotationStore<B>,
    events_tx: &broadcast::Sender<EditorEvent>,
) -> bool {
    let emit = |event: EditorEvent| {
        let _ = events_tx.send(event);
    };

    match cmd {
        Command::Load { image_id, resp } => {
            let res = store.load(&image_id).await.map(|()| {
                let count = store.annotations().len();
                emit(EditorEvent::Loaded { image_id, count });
                count
            });
            let _ = resp.send(res.map_err(RuntimeError::from));
        }
        Command::Create { draft, resp } => {
            let res = store.create(draft).await.inspect(|ann| {
                emit(EditorEvent::Created { id: ann.id.clone() });
            });
            let _ = resp.send(res.map_err(RuntimeError::from));
        }
        Command::Delete { id, resp } => {
            let res = store.delete(&id).await.inspect(|&deleted| {
                if deleted {
                    emit(EditorEvent::Deleted { id: id.clone() });
                }
            });
            let _ = resp.send(res.map_err(RuntimeError::from));
        }
        Command::Update { id, patch, resp } => {
            let res = store.update(&id, patch).await.inspect(|updated| {
                if let Some(ann) = updated {
                    emit(EditorEvent::Updated { id: ann.id.clone() });
                }
            });
            let _ = resp.send(res.map_err(RuntimeError::from));
        }
        Command::Merge {
            ids,
            class_id,
            class_name,
            resp,
        } => {
            let res = store
                .merge(&ids, class_id, &class_name)
                .await
                .inspect(|merged| {
                    if let Some(ann) = merged {
                        emit(EditorEvent::Merged {
                            id: ann.id.clone(),
                            sources: ids.clone(),
                        });
                    }
                });
            let _ = resp.send(res.map_err(RuntimeError::from));
        }
        Command::Brush {
            id,
            path,
            radius,
            op,
            resp,
        } => {
            let known = store.get(&id).is_some();
            let res = store
                .apply_brush(&id, &path, radius, op)
                .await
                .inspect(|brushed| match brushed {
                    Some(ann) => emit(EditorEvent::Brushed { id: ann.id.clone() }),
                    // fully erased
                    None if known => emit(EditorEvent::Deleted { id: id.clone() }),
                    None => {}
                });
            let _ = resp.send(res.map_err(RuntimeError::from));
        }
        Command::Undo { resp } => {
            let res = store.undo().await.inspect(|&applied| {
                if applied {
                    emit(EditorEvent::UndoApplied);
                }
            });
            let _ = resp.send(res.map_err(RuntimeError::from));
        }
        Command::Redo { resp } => {
            let res = store.redo().await.inspect(|&applied| {
                if applied {
                    emit(EditorEvent::RedoApplied);
                }
            });
            let _ = resp.send(res.map_err(RuntimeError::from));
        }
        Command::Get { id, resp } => {
            let _ = resp.send(store.get(&id).cloned());
        }
        Command::Annotations { resp } => {
            let _ = resp.send(store.annotations().to_vec());
        }
        Command::History { resp } => {
            let _ = resp.send(HistoryStatus {
                can_undo: store.can_undo(),
                can_redo: store.can_redo(),
            });
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(());
            return true;
        }
    }

    false
}
