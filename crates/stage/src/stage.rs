use crate::config::ShowcaseConfig;
use crate::diagnostics::Diagnostics;
use crate::error::StageError;
use crate::loading::LoadingTracker;
use crate::pipeline::{LoadEvent, LoadStage, LoadedAsset};
use glam::{Vec2, Vec3};
use showcase_common::SurfaceSize;
use showcase_input::{OrbitControls, PointerButton};
use showcase_render::{FrameInput, Overlay, PerspectiveCamera};
use showcase_scene::{Background, Node, Scene};

/// The viewport context of one mount: camera, scene, orbit controller,
/// loading state, diagnostics and overlay.
///
/// Built fresh on every mount; nothing survives an unmount.
#[derive(Debug)]
pub struct Stage {
    config: ShowcaseConfig,
    camera: PerspectiveCamera,
    scene: Scene,
    controls: OrbitControls,
    loading: LoadingTracker,
    diagnostics: Diagnostics,
    overlay: Overlay,
}

impl Stage {
    /// Camera, ambient light and controller for a surface of `size`.
    pub fn new(config: ShowcaseConfig, size: SurfaceSize) -> Result<Self, StageError> {
        let cam = &config.camera;
        let mut camera = PerspectiveCamera::new(cam.fov_degrees, size.aspect(), cam.near, cam.far);
        camera.position = Vec3::from_array(cam.position);

        let mut scene = Scene::new();
        scene.add(Node::ambient_light(config.ambient).with_name("Ambient Light"))?;

        let mut controls = OrbitControls::new(config.orbit.limits, config.orbit.bindings);
        controls.target = Vec3::from_array(cam.target);
        controls.enable_damping = config.orbit.enable_damping;
        controls.damping_factor = config.orbit.damping_factor;
        controls.enable_pan = config.orbit.enable_pan;
        controls.set_viewport(size);
        controls.update(&mut camera);

        let loading = LoadingTracker::new(config.loading_policy);
        let overlay = Overlay {
            loading: loading.is_pending(),
            contact: config.contact.clone(),
        };

        tracing::debug!(width = size.width, height = size.height, "stage created");
        Ok(Self {
            config,
            camera,
            scene,
            controls,
            loading,
            diagnostics: Diagnostics::new(),
            overlay,
        })
    }

    pub fn config(&self) -> &ShowcaseConfig {
        &self.config
    }

    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut OrbitControls {
        &mut self.controls
    }

    pub fn loading(&self) -> &LoadingTracker {
        &self.loading
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// New projection aspect and input viewport.
    pub fn resize(&mut self, size: SurfaceSize) {
        let size = SurfaceSize::new(size.width, size.height);
        self.camera.set_viewport(size);
        self.controls.set_viewport(size);
    }

    /// Advance controller damping. Returns whether the camera moved.
    pub fn update(&mut self) -> bool {
        self.controls.update(&mut self.camera)
    }

    pub fn frame_input(&self) -> FrameInput<'_> {
        FrameInput {
            scene: &self.scene,
            camera: &self.camera,
            overlay: &self.overlay,
        }
    }

    pub fn pointer_down(&mut self, button: PointerButton, position: Vec2) {
        self.controls.pointer_down(button, position);
    }

    pub fn pointer_move(&mut self, position: Vec2) {
        self.controls.pointer_move(position, &self.camera);
    }

    pub fn pointer_up(&mut self, button: PointerButton) {
        self.controls.pointer_up(button);
    }

    pub fn wheel(&mut self, delta_y: f32) {
        self.controls.wheel(delta_y);
    }

    pub fn touch_start(&mut self, id: u64, position: Vec2) {
        self.controls.touch_start(id, position);
    }

    pub fn touch_move(&mut self, id: u64, position: Vec2) {
        self.controls.touch_move(id, position, &self.camera);
    }

    pub fn touch_end(&mut self, id: u64) {
        self.controls.touch_end(id);
    }

    /// Apply one load event to the scene.
    ///
    /// Text is refused until the model node is attached. Failures become
    /// diagnostics and never error.
    pub fn apply(&mut self, event: LoadEvent) -> Result<(), StageError> {
        let result = match event {
            LoadEvent::Loaded(asset) => {
                let stage = asset.stage();
                let attached = self.attach(asset);
                self.loading.settle(stage);
                attached
            }
            LoadEvent::Failed { stage, message } => {
                self.diagnostics.record(stage, message);
                self.loading.settle(stage);
                Ok(())
            }
            LoadEvent::Skipped { stage } => {
                tracing::debug!(%stage, "load stage skipped");
                self.loading.settle(stage);
                Ok(())
            }
            LoadEvent::Finished => {
                self.loading.finish();
                Ok(())
            }
        };
        self.overlay.loading = self.loading.is_pending();
        result
    }

    fn attach(&mut self, asset: LoadedAsset) -> Result<(), StageError> {
        match asset {
            LoadedAsset::Environment(env) => {
                tracing::info!(width = env.width, height = env.height, "environment applied");
                self.scene.set_background(Background::Environment(env.clone()));
                self.scene.set_environment(env);
            }
            LoadedAsset::Model(node) => {
                let nodes = node.subtree_len();
                self.scene.add(node)?;
                tracing::info!(nodes, "model attached");
            }
            LoadedAsset::Text(node) => {
                let model = &self.config.model.name;
                if self.scene.find_by_name(model).is_none() {
                    return Err(StageError::MissingDependency {
                        node: node.name,
                        requires: model.clone(),
                    });
                }
                self.scene.add(node)?;
                tracing::info!("text attached");
            }
        }
        Ok(())
    }

    /// Whether every stage has been applied or reported.
    pub fn is_settled(&self) -> bool {
        LoadStage::ALL.iter().all(|s| self.loading.is_settled(*s))
    }
}
