use std::{
    io,
    path::{Path, PathBuf},
    sync::RwLock,
};

use tracing::info;

use crate::{
    collaborator::{BoxFuture, CollaboratorError, TapeStore},
    logging::category_tapes,
};

const COMPONENT: &str = "tape store";
const TAPE_EXTENSIONS: [&str; 2] = ["json5", "json"];

/// Filesystem-backed tape location. Only the active directory and the number
/// of tapes found there are tracked; reading and writing tapes belongs to the
/// recording pipeline.
pub struct FsTapeStore {
    active: RwLock<ActiveDirectory>,
}

#[derive(Clone, Debug)]
struct ActiveDirectory {
    path: PathBuf,
    tape_count: usize,
}

impl FsTapeStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CollaboratorError> {
        let path = path.into();
        let tape_count = prepare_directory(&path)
            .await
            .map_err(|err| CollaboratorError::new(COMPONENT, err))?;
        info!(
            "{} opened {} ({tape_count} tapes)",
            category_tapes(),
            path.display()
        );
        Ok(Self {
            active: RwLock::new(ActiveDirectory { path, tape_count }),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.active
            .read()
            .expect("tape store lock poisoned")
            .path
            .clone()
    }

    pub fn tape_count(&self) -> usize {
        self.active
            .read()
            .expect("tape store lock poisoned")
            .tape_count
    }
}

impl TapeStore for FsTapeStore {
    fn set_path<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            let tape_count = prepare_directory(path)
                .await
                .map_err(|err| CollaboratorError::new(COMPONENT, err))?;

            let previous = {
                let mut guard = self.active.write().expect("tape store lock poisoned");
                std::mem::replace(
                    &mut *guard,
                    ActiveDirectory {
                        path: path.to_path_buf(),
                        tape_count,
                    },
                )
            };
            info!(
                "{} switched {} -> {} ({tape_count} tapes)",
                category_tapes(),
                previous.path.display(),
                path.display()
            );
            Ok(())
        })
    }
}

async fn prepare_directory(path: &Path) -> io::Result<usize> {
    tokio::fs::create_dir_all(path).await?;

    let mut entries = tokio::fs::read_dir(path).await?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if is_tape_file(&entry.path()) && entry.file_type().await?.is_file() {
            count += 1;
        }
    }
    Ok(count)
}

fn is_tape_file(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .map(|ext| TAPE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}
