use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::backend::Network;
use super::backends::SyntheticNetwork;

/// How a catalog entry is turned into a running network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkKind {
    /// Deterministic, model-free detector for demos and tests.
    Synthetic,
    /// ONNX model on disk with the given input resolution.
    Onnx { input_width: u32, input_height: u32 },
}

/// A named network the CLI can load.
#[derive(Clone, Debug)]
pub struct NetworkEntry {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: NetworkKind,
}

/// Settings shared by every network constructor.
#[derive(Clone, Debug)]
pub struct NetworkSettings {
    /// Directory holding `<name>/model.onnx` and `<name>/labels.txt`.
    pub model_dir: PathBuf,
    /// Minimum confidence for a detection to be reported.
    pub threshold: f32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("networks"),
            threshold: 0.5,
        }
    }
}

impl NetworkSettings {
    pub fn model_path(&self, name: &str) -> PathBuf {
        self.model_dir.join(name).join("model.onnx")
    }

    pub fn labels_path(&self, name: &str) -> PathBuf {
        self.model_dir.join(name).join("labels.txt")
    }
}

/// Catalog of loadable networks, keyed by name.
pub struct NetworkRegistry {
    entries: BTreeMap<&'static str, NetworkEntry>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registry pre-populated with the stock detection models.
    pub fn builtin() -> Self {
        let ssd = NetworkKind::Onnx {
            input_width: 300,
            input_height: 300,
        };
        let detectnet = NetworkKind::Onnx {
            input_width: 640,
            input_height: 360,
        };
        let mut registry = Self::new();
        registry.register(NetworkEntry {
            name: "synthetic",
            description: "model-free test detector (no files needed)",
            kind: NetworkKind::Synthetic,
        });
        for (name, description, kind) in [
            ("ssd-mobilenet-v1", "SSD-Mobilenet-v1, 91 COCO classes", ssd),
            ("ssd-mobilenet-v2", "SSD-Mobilenet-v2, 91 COCO classes", ssd),
            ("ssd-inception-v2", "SSD-Inception-v2, 91 COCO classes", ssd),
            ("pednet", "DetectNet pedestrians", detectnet),
            ("multiped", "DetectNet pedestrians and luggage", detectnet),
            ("facenet", "DetectNet faces", detectnet),
            ("coco-airplane", "DetectNet COCO airplanes", detectnet),
            ("coco-bottle", "DetectNet COCO bottles", detectnet),
            ("coco-chair", "DetectNet COCO chairs", detectnet),
            ("coco-dog", "DetectNet COCO dogs", detectnet),
        ] {
            registry.register(NetworkEntry {
                name,
                description,
                kind,
            });
        }
        registry
    }

    pub fn register(&mut self, entry: NetworkEntry) {
        self.entries.insert(entry.name, entry);
    }

    pub fn get(&self, name: &str) -> Option<&NetworkEntry> {
        self.entries.get(name)
    }

    /// Registered names in sorted order.
    pub fn list(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Help text listing every network.
    pub fn usage(&self) -> String {
        let mut out = String::from("networks (--network):\n");
        for entry in self.entries.values() {
            out.push_str(&format!("  {:<18} {}\n", entry.name, entry.description));
        }
        out
    }

    /// Construct the named network.
    pub fn build(&self, name: &str, settings: &NetworkSettings) -> Result<Box<dyn Network>> {
        let entry = self.get(name).ok_or_else(|| {
            anyhow!(
                "unknown network '{}' (available: {})",
                name,
                self.list().join(", ")
            )
        })?;

        match entry.kind {
            NetworkKind::Synthetic => Ok(Box::new(SyntheticNetwork::new(settings.threshold))),
            NetworkKind::Onnx {
                input_width,
                input_height,
            } => build_onnx(entry.name, input_width, input_height, settings),
        }
    }
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(feature = "backend-tract")]
fn build_onnx(
    name: &str,
    input_width: u32,
    input_height: u32,
    settings: &NetworkSettings,
) -> Result<Box<dyn Network>> {
    let labels = Labels::from_file(&settings.labels_path(name))?;
    let network = super::backends::TractNetwork::new(
        name,
        settings.model_path(name),
        input_width,
        input_height,
        labels,
    )?
    .with_threshold(settings.threshold);
    Ok(Box::new(network))
}

#[cfg(not(feature = "backend-tract"))]
fn build_onnx(
    name: &str,
    _input_width: u32,
    _input_height: u32,
    settings: &NetworkSettings,
) -> Result<Box<dyn Network>> {
    Err(anyhow!(
        "network '{}' ({}) requires the backend-tract feature; use --network=synthetic without it",
        name,
        settings.model_path(name).display()
    ))
}

// ----------------------------------------------------------------------------
// Class labels
// ----------------------------------------------------------------------------

/// Class id to display name mapping.
#[derive(Clone, Debug, Default)]
pub struct Labels {
    names: Vec<String>,
}

impl Labels {
    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    /// One label per line; blank lines keep their index.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        Ok(Self::parse(&raw))
    }

    pub fn parse(raw: &str) -> Self {
        Self {
            names: raw.lines().map(|line| line.trim().to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, class_id: u32) -> String {
        match self.names.get(class_id as usize) {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("class {}", class_id),
        }
    }
}
