use crate::config::{CodecConfig, ModelConfig, ShowcaseConfig, TextConfig};
use crate::frame::CancelToken;
use futures::future::{self, Either};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use showcase_assets::{
    AssetError, AssetSource, CommandCodec, DRACO_EXTENSION, DecoderBundle, Font, ModelLoader,
    build_text_geometry, decode_environment, unblock,
};
use showcase_common::Transform;
use showcase_scene::{EnvironmentMap, Material, Node};
use std::cell::RefCell;
use std::pin::pin;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use tracing::Instrument;

/// One step of the asset load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadStage {
    Environment,
    Model,
    Text,
}

impl LoadStage {
    pub const ALL: [LoadStage; 3] = [LoadStage::Environment, LoadStage::Model, LoadStage::Text];
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LoadStage::Environment => "environment",
            LoadStage::Model => "model",
            LoadStage::Text => "text",
        })
    }
}

/// How the environment stage is scheduled against the model chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOrder {
    /// Environment, then model, then text.
    #[default]
    Sequential,
    /// Environment interleaved with model then text.
    Concurrent,
}

/// A decoded asset ready to be attached to the scene.
#[derive(Debug, Clone)]
pub enum LoadedAsset {
    Environment(Arc<EnvironmentMap>),
    /// Prepared model root, already named and shadow-enabled.
    Model(Node),
    Text(Node),
}

impl LoadedAsset {
    pub fn stage(&self) -> LoadStage {
        match self {
            LoadedAsset::Environment(_) => LoadStage::Environment,
            LoadedAsset::Model(_) => LoadStage::Model,
            LoadedAsset::Text(_) => LoadStage::Text,
        }
    }
}

/// Progress reported by [`LoadPipeline::run`].
#[derive(Debug, Clone)]
pub enum LoadEvent {
    Loaded(LoadedAsset),
    Failed { stage: LoadStage, message: String },
    /// The stage never ran because something it depends on failed.
    Skipped { stage: LoadStage },
    Finished,
}

/// Receives load events in the order they happen.
pub trait LoadSink {
    fn send(&mut self, event: LoadEvent);
}

impl LoadSink for Vec<LoadEvent> {
    fn send(&mut self, event: LoadEvent) {
        self.push(event);
    }
}

impl LoadSink for Sender<LoadEvent> {
    fn send(&mut self, event: LoadEvent) {
        // A closed receiver means the mount is gone.
        let _ = Sender::send(self, event);
    }
}

/// Async asset load for one mount.
///
/// The text stage is a continuation of a successful model stage; a model
/// failure skips it. Decoding runs on worker threads, so with
/// [`LoadOrder::Concurrent`] the environment and the model chain overlap.
/// Cancelling the token abandons in-flight fetches and decodes at once and
/// no event is delivered after cancellation.
#[derive(Debug, Clone)]
pub struct LoadPipeline {
    config: ShowcaseConfig,
    cancel: CancelToken,
}

impl LoadPipeline {
    pub fn new(config: ShowcaseConfig, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Model loader with the configured decoder path and codec.
    pub fn model_loader(&self) -> ModelLoader {
        model_loader(&self.config.model)
    }

    pub async fn run<S: AssetSource, K: LoadSink>(&self, source: &S, sink: &mut K) {
        let order = self.config.load_order;
        let sink = RefCell::new(sink);
        let span = tracing::info_span!("load_pipeline", ?order);
        async {
            if self.cancel.is_cancelled() {
                return;
            }
            let work = pin!(async {
                match order {
                    LoadOrder::Sequential => {
                        self.environment(source, &sink).await;
                        self.model_then_text(source, &sink).await;
                    }
                    LoadOrder::Concurrent => {
                        futures::join!(
                            self.environment(source, &sink),
                            self.model_then_text(source, &sink)
                        );
                    }
                }
            });
            let cancelled = pin!(self.cancel.cancelled());
            if let Either::Right(_) = future::select(work, cancelled).await {
                tracing::debug!("load pipeline cancelled mid-stage");
                return;
            }
            if self.cancel.is_cancelled() {
                tracing::debug!("load pipeline cancelled");
                return;
            }
            tracing::info!("load pipeline finished");
            self.emit(&sink, LoadEvent::Finished);
        }
        .instrument(span)
        .await
    }

    fn emit<K: LoadSink>(&self, sink: &RefCell<&mut K>, event: LoadEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        sink.borrow_mut().send(event);
    }

    fn fail<K: LoadSink>(&self, sink: &RefCell<&mut K>, stage: LoadStage, error: AssetError) {
        tracing::warn!(%stage, %error, "load stage failed");
        self.emit(
            sink,
            LoadEvent::Failed {
                stage,
                message: error.to_string(),
            },
        );
    }

    async fn environment<S: AssetSource, K: LoadSink>(&self, source: &S, sink: &RefCell<&mut K>) {
        if self.cancel.is_cancelled() {
            return;
        }
        let result = async {
            let asset = source.fetch(&self.config.assets.environment).await?;
            unblock("environment", move || decode_environment(&asset)).await
        }
        .await;
        match result {
            Ok(env) => self.emit(
                sink,
                LoadEvent::Loaded(LoadedAsset::Environment(Arc::new(env))),
            ),
            Err(e) => self.fail(sink, LoadStage::Environment, e),
        }
    }

    async fn model_then_text<S: AssetSource, K: LoadSink>(
        &self,
        source: &S,
        sink: &RefCell<&mut K>,
    ) {
        if self.cancel.is_cancelled() {
            return;
        }
        let model = async {
            let asset = source.fetch(&self.config.assets.model).await?;
            let loader = self.model_loader();
            let config = self.config.model.clone();
            unblock("model", move || Ok(prepare_model(loader.load(&asset)?, &config))).await
        }
        .await;
        match model {
            Ok(node) => self.emit(sink, LoadEvent::Loaded(LoadedAsset::Model(node))),
            Err(e) => {
                self.fail(sink, LoadStage::Model, e);
                self.emit(
                    sink,
                    LoadEvent::Skipped {
                        stage: LoadStage::Text,
                    },
                );
                return;
            }
        }

        if self.cancel.is_cancelled() {
            return;
        }
        let text = async {
            let asset = source.fetch(&self.config.assets.font).await?;
            let config = self.config.text.clone();
            unblock("text", move || {
                let font = Font::from_json(&asset.bytes)?;
                let missing = font.missing_glyphs(&config.content);
                if !missing.is_empty() {
                    tracing::warn!(?missing, family = %font.family, "glyphs missing from font");
                }
                let geometry = build_text_geometry(&font, &config.content, &config.options)?;
                Ok(text_node(geometry, &config))
            })
            .await
        }
        .await;
        match text {
            Ok(node) => self.emit(sink, LoadEvent::Loaded(LoadedAsset::Text(node))),
            Err(e) => self.fail(sink, LoadStage::Text, e),
        }
    }
}

fn model_loader(config: &ModelConfig) -> ModelLoader {
    let loader = ModelLoader::new(config.decoder_path.clone());
    match &config.codec {
        CodecConfig::Bundle { runtime } => loader.with_codec(Arc::new(
            DecoderBundle::new(config.decoder_path.clone()).with_runtime(runtime.clone()),
        )),
        CodecConfig::Command { command } => {
            match CommandCodec::from_command_line(DRACO_EXTENSION, command) {
                Some(codec) => loader.with_codec(Arc::new(codec)),
                None => loader,
            }
        }
        CodecConfig::Disabled => loader,
    }
}

fn prepare_model(mut root: Node, config: &ModelConfig) -> Node {
    root.prepare_for_showcase(config.env_map_intensity);
    root.name = config.name.clone();
    root
}

fn text_node(geometry: showcase_scene::MeshGeometry, config: &TextConfig) -> Node {
    let mut material = Material::standard(config.color, config.roughness, config.metalness);
    material.name = config.name.clone();
    material.wireframe = config.wireframe;

    let mut transform = Transform::from_position(Vec3::from_array(config.position));
    transform.rotate_y(config.rotation_y_degrees.to_radians());

    let mut node = Node::mesh(geometry, material)
        .with_name(config.name.clone())
        .with_transform(transform);
    node.cast_shadow = true;
    node.receive_shadow = true;
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySource;
    use showcase_assets::{AssetBytes, FsSource, fixtures};
    use showcase_scene::NodeKind;
    use std::time::Duration;

    fn stages(events: &[LoadEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match e {
                LoadEvent::Loaded(a) => format!("loaded:{}", a.stage()),
                LoadEvent::Failed { stage, .. } => format!("failed:{stage}"),
                LoadEvent::Skipped { stage } => format!("skipped:{stage}"),
                LoadEvent::Finished => "finished".into(),
            })
            .collect()
    }

    fn run(config: ShowcaseConfig, source: &MemorySource) -> Vec<LoadEvent> {
        let pipeline = LoadPipeline::new(config, CancelToken::new());
        let mut events = Vec::new();
        pollster::block_on(pipeline.run(source, &mut events));
        events
    }

    #[test]
    fn sequential_order_is_environment_model_text() {
        let events = run(ShowcaseConfig::default(), &MemorySource::complete());
        assert_eq!(
            stages(&events),
            ["loaded:environment", "loaded:model", "loaded:text", "finished"]
        );
    }

    fn concurrent() -> ShowcaseConfig {
        ShowcaseConfig {
            load_order: LoadOrder::Concurrent,
            ..ShowcaseConfig::default()
        }
    }

    fn position(events: &[String], stage: &str) -> usize {
        events.iter().position(|e| e == stage).unwrap()
    }

    #[test]
    fn concurrent_environment_can_settle_after_model() {
        // The environment only arrives once the text stage has started.
        let source = MemorySource::complete()
            .with_gate("environment.hdr", "helvetiker_regular.typeface.json");
        let events = stages(&run(concurrent(), &source));
        assert_eq!(events.len(), 4, "{events:?}");
        assert!(position(&events, "loaded:model") < position(&events, "loaded:environment"));
        assert!(position(&events, "loaded:model") < position(&events, "loaded:text"));
        assert_eq!(events[3], "finished");
    }

    #[test]
    fn concurrent_load_from_disk_overlaps_fetches() {
        struct Handshake {
            files: FsSource,
            model_fetched: std::sync::Mutex<Option<std::sync::mpsc::Sender<()>>>,
            environment_gate: std::sync::Mutex<Option<std::sync::mpsc::Receiver<()>>>,
        }

        impl AssetSource for Handshake {
            async fn fetch(&self, path: &str) -> Result<AssetBytes, AssetError> {
                if path == "environment.hdr" {
                    // Blocks a worker until the model fetch has begun.
                    let gate = self.environment_gate.lock().unwrap().take();
                    unblock("gate", move || {
                        gate.and_then(|rx| rx.recv_timeout(Duration::from_secs(5)).ok())
                            .ok_or_else(|| AssetError::Codec("model fetch never started".into()))
                    })
                    .await?;
                } else if let Some(tx) = self.model_fetched.lock().unwrap().take() {
                    let _ = tx.send(());
                }
                self.files.fetch(path).await
            }
        }

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("environment.hdr"),
            fixtures::uniform_hdr(8, 4, [0.5, 0.5, 0.5]).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("model-transformed.glb"), fixtures::triangle_glb(&[])).unwrap();
        std::fs::write(
            dir.path().join("helvetiker_regular.typeface.json"),
            fixtures::box_typeface_json(),
        )
        .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        let source = Handshake {
            files: FsSource::new(dir.path()),
            model_fetched: std::sync::Mutex::new(Some(tx)),
            environment_gate: std::sync::Mutex::new(Some(rx)),
        };
        let pipeline = LoadPipeline::new(concurrent(), CancelToken::new());
        let mut events = Vec::new();
        pollster::block_on(pipeline.run(&source, &mut events));

        let events = stages(&events);
        for stage in ["loaded:environment", "loaded:model", "loaded:text"] {
            assert!(events.contains(&stage.to_string()), "{events:?}");
        }
        assert_eq!(events.last().map(String::as_str), Some("finished"));
    }

    #[test]
    fn cancel_interrupts_a_stalled_fetch() {
        let token = CancelToken::new();
        let pipeline = LoadPipeline::new(ShowcaseConfig::default(), token.clone());
        let source = MemorySource::complete().stalled("model-transformed.glb");

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            token.cancel();
        });
        let mut events = Vec::new();
        pollster::block_on(pipeline.run(&source, &mut events));
        canceller.join().unwrap();

        assert_eq!(stages(&events), ["loaded:environment"]);
        assert!(!source.fetched().contains(&"helvetiker_regular.typeface.json".to_string()));
    }

    #[test]
    fn model_failure_skips_text() {
        let source = MemorySource::complete().without("model-transformed.glb");
        let events = run(ShowcaseConfig::default(), &source);
        assert_eq!(
            stages(&events),
            ["loaded:environment", "failed:model", "skipped:text", "finished"]
        );
        assert!(!source.fetched().contains(&"helvetiker_regular.typeface.json".to_string()));
    }

    #[test]
    fn font_failure_is_reported_once() {
        let source = MemorySource::complete().with_file("helvetiker_regular.typeface.json", b"{}".to_vec());
        let events = run(ShowcaseConfig::default(), &source);
        assert_eq!(
            stages(&events),
            ["loaded:environment", "loaded:model", "failed:text", "finished"]
        );
    }

    #[test]
    fn default_codec_is_decoder_bundle_at_decoder_path() {
        let loader = model_loader(&ModelConfig::default());
        let codec = loader.codec().unwrap();
        assert_eq!(codec.extension(), DRACO_EXTENSION);
        let described = format!("{codec:?}");
        assert!(described.contains("DecoderBundle"), "{described}");
        assert!(described.contains("gstatic.com/draco"), "{described}");
    }

    #[test]
    fn compressed_model_without_codec_names_decoder_path() {
        let source = MemorySource::complete()
            .with_file("model-transformed.glb", fixtures::draco_triangle_glb(&[1]));
        let mut config = ShowcaseConfig::default();
        config.model.codec = CodecConfig::Disabled;
        let events = run(config, &source);
        let message = events
            .iter()
            .find_map(|e| match e {
                LoadEvent::Failed { stage: LoadStage::Model, message } => Some(message.clone()),
                _ => None,
            })
            .unwrap();
        assert!(message.contains(DRACO_EXTENSION));
        assert!(message.contains("gstatic.com/draco"));
    }

    #[test]
    fn cancelled_pipeline_delivers_nothing() {
        let token = CancelToken::new();
        token.cancel();
        let pipeline = LoadPipeline::new(ShowcaseConfig::default(), token);
        let source = MemorySource::complete();
        let mut events = Vec::new();
        pollster::block_on(pipeline.run(&source, &mut events));
        assert!(events.is_empty());
        assert!(source.fetched().is_empty());
    }

    #[test]
    fn model_is_prepared_for_showcase() {
        let events = run(ShowcaseConfig::default(), &MemorySource::complete());
        let model = events
            .iter()
            .find_map(|e| match e {
                LoadEvent::Loaded(LoadedAsset::Model(n)) => Some(n.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(model.name, "Base Model");
        assert!(model.cast_shadow && model.receive_shadow);
        model.traverse(&mut |n| {
            if let Some(m) = n.material() {
                assert!(n.cast_shadow && n.receive_shadow);
                assert_eq!(m.env_map_intensity, 1.0);
            }
        });
    }

    #[test]
    fn text_node_uses_configured_look() {
        let events = run(ShowcaseConfig::default(), &MemorySource::complete());
        let text = events
            .iter()
            .find_map(|e| match e {
                LoadEvent::Loaded(LoadedAsset::Text(n)) => Some(n.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(text.name, "InfoText");
        assert_eq!(text.transform.position, Vec3::new(-14.0, 5.3, 0.7));
        let NodeKind::Mesh { geometry, material } = &text.kind else {
            panic!("text should be a mesh");
        };
        assert!(!geometry.is_empty());
        assert!(material.wireframe);
        assert_eq!(material.roughness, 1.0);
        assert_eq!(material.metalness, 1.0);
        assert_eq!(material.color.to_hex(), 0xa4eeea);
        let center = geometry.bounding_box().unwrap().center();
        assert!(center.length() < 1e-4, "text geometry is centred");
    }

    #[test]
    fn sender_sink_forwards_events() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut tx = tx;
        LoadSink::send(&mut tx, LoadEvent::Finished);
        assert!(matches!(rx.try_recv(), Ok(LoadEvent::Finished)));
    }
}
