use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{MetricsReport, ModelType, StudySessionRecord};

/// Durable storage for trained model artifacts. `load` returning `None`
/// means the model has never been trained.
pub trait ArtifactStore: Send + Sync {
    fn save(&self, model_type: ModelType, artifact: &Value) -> Result<()>;

    fn load(&self, model_type: ModelType) -> Result<Option<Value>>;
}

/// Stores one `<model_type>_model.json` file per model under a directory.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, model_type: ModelType) -> PathBuf {
        self.dir.join(format!("{}_model.json", model_type.as_str()))
    }
}

impl ArtifactStore for FileArtifactStore {
    fn save(&self, model_type: ModelType, artifact: &Value) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(model_type);
        // Readers never see a half-written artifact.
        let staging = path.with_extension("json.tmp");
        std::fs::write(&staging, serde_json::to_vec(artifact)?)?;
        std::fs::rename(&staging, &path)?;
        info!(model_type = %model_type, path = %path.display(), "model artifact saved");
        Ok(())
    }

    fn load(&self, model_type: ModelType) -> Result<Option<Value>> {
        let path = self.path_for(model_type);
        if !path.exists() {
            debug!(model_type = %model_type, "no saved artifact");
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

/// A model whose trained state round-trips through an [`ArtifactStore`].
pub trait TrainableModel: Default + Serialize + DeserializeOwned {
    const MODEL_TYPE: ModelType;

    fn is_trained(&self) -> bool;

    fn train(&mut self, records: &[StudySessionRecord]) -> Result<MetricsReport>;

    fn save(&self, store: &dyn ArtifactStore) -> Result<()> {
        store.save(Self::MODEL_TYPE, &serde_json::to_value(self)?)
    }

    /// Rebuilds a model from the store. Missing or unreadable artifacts
    /// yield an untrained model.
    fn load(store: &dyn ArtifactStore) -> Self {
        match store.load(Self::MODEL_TYPE) {
            Ok(Some(value)) => match serde_json::from_value::<Self>(value) {
                Ok(model) => {
                    info!(model_type = %Self::MODEL_TYPE, trained = model.is_trained(), "model loaded");
                    model
                }
                Err(err) => {
                    warn!(model_type = %Self::MODEL_TYPE, error = %err, "discarding unreadable artifact");
                    Self::default()
                }
            },
            Ok(None) => Self::default(),
            Err(err) => {
                warn!(model_type = %Self::MODEL_TYPE, error = %err, "artifact store unavailable");
                Self::default()
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn file_store_round_trips_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path().join("models"));

        assert!(store.load(ModelType::Scheduling).unwrap().is_none());
        store
            .save(ModelType::Scheduling, &json!({ "fitted": null }))
            .unwrap();
        let loaded = store.load(ModelType::Scheduling).unwrap();
        assert_eq!(loaded, Some(json!({ "fitted": null })));
        assert!(dir.path().join("models/scheduling_model.json").exists());
    }

    #[test]
    fn saving_replaces_the_artifact_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path());
        store.save(ModelType::Performance, &json!({ "round": 1 })).unwrap();
        store.save(ModelType::Performance, &json!({ "round": 2 })).unwrap();

        assert_eq!(
            store.load(ModelType::Performance).unwrap(),
            Some(json!({ "round": 2 }))
        );
        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["performance_model.json".to_string()]);
    }

    #[test]
    fn corrupt_artifacts_surface_as_store_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("performance_model.json"), b"{not json").unwrap();
        let store = FileArtifactStore::new(dir.path());
        assert!(store.load(ModelType::Performance).is_err());
    }
}
