use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use minijinja::{Environment, Error, State};
use sha2::{Digest, Sha256};

/// Resolves `asset("site.css")` in templates to a cache-busting URL such as
/// `/static/site.css?v=3f2a...`. Hashes are computed once per path.
#[derive(Debug, Clone)]
pub struct AssetLoader {
    root: PathBuf,
    cache: Arc<RwLock<HashMap<String, String>>>,
}

impl AssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Arc::default(),
        }
    }

    pub fn asset_path(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if let Some(hashed_path) = self.cache.read().ok().and_then(|c| c.get(path).cloned()) {
            return hashed_path;
        }

        match fs::read(self.root.join(path)) {
            Ok(contents) => {
                let hash = hex::encode(Sha256::digest(contents));
                let hashed_path = format!("/static/{}?v={}", path, &hash[..16]);
                if let Ok(mut cache) = self.cache.write() {
                    cache.insert(path.to_string(), hashed_path.clone());
                }
                hashed_path
            }
            // Missing files are not cached so they pick up a hash once deployed.
            Err(_) => format!("/static/{}", path),
        }
    }

    pub fn register(&self, env: &mut Environment<'_>) {
        let loader = self.clone();
        env.add_function("asset", move |_state: &State, path: String| -> Result<String, Error> {
            Ok(loader.asset_path(&path))
        });
    }
}
