use crate::config::ShowcaseConfig;
use crate::error::{HostError, StageError};
use crate::frame::{CancelToken, FrameLoop};
use crate::pipeline::{LoadEvent, LoadPipeline};
use crate::stage::Stage;
use showcase_common::SurfaceSize;
use showcase_render::{DebugTextRenderer, RenderBackend, RendererSettings};
use std::collections::VecDeque;

/// Whatever provides the drawable surface: a window, or nothing at all.
///
/// A host hands out at most one render backend at a time and gets it back,
/// already disposed, on detach.
pub trait SurfaceHost {
    type Backend: RenderBackend;

    fn size(&self) -> SurfaceSize;

    fn attach(&mut self, settings: RendererSettings) -> Result<Self::Backend, HostError>;

    fn detach(&mut self, backend: Self::Backend);

    fn listen_resize(&mut self);

    fn unlisten_resize(&mut self);

    fn is_listening(&self) -> bool;

    /// Next queued resize, for hosts that buffer them.
    fn poll_resize(&mut self) -> Option<SurfaceSize> {
        None
    }
}

/// Host with no window, rendering frames as text.
#[derive(Debug)]
pub struct HeadlessHost {
    size: SurfaceSize,
    attached: usize,
    mounts: u64,
    released: u64,
    listening: bool,
    pending: VecDeque<SurfaceSize>,
}

impl HeadlessHost {
    pub fn new(size: SurfaceSize) -> Self {
        Self {
            size,
            attached: 0,
            mounts: 0,
            released: 0,
            listening: false,
            pending: VecDeque::new(),
        }
    }

    /// Surfaces currently attached.
    pub fn attached_surfaces(&self) -> usize {
        self.attached
    }

    pub fn mounts(&self) -> u64 {
        self.mounts
    }

    /// Backends handed back with their resources released.
    pub fn released(&self) -> u64 {
        self.released
    }

    /// Simulate the host changing size. Delivered only while someone listens.
    pub fn resize(&mut self, size: SurfaceSize) -> bool {
        self.size = SurfaceSize::new(size.width, size.height);
        if !self.listening {
            return false;
        }
        self.pending.push_back(self.size);
        true
    }
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new(SurfaceSize::default())
    }
}

impl SurfaceHost for HeadlessHost {
    type Backend = DebugTextRenderer;

    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn attach(&mut self, settings: RendererSettings) -> Result<DebugTextRenderer, HostError> {
        if self.attached > 0 {
            return Err(HostError::AlreadyAttached);
        }
        self.attached += 1;
        self.mounts += 1;
        Ok(DebugTextRenderer::new(self.size, settings))
    }

    fn detach(&mut self, backend: DebugTextRenderer) {
        if backend.is_disposed() {
            self.released += 1;
        } else {
            tracing::warn!("backend detached without being disposed");
        }
        self.attached = self.attached.saturating_sub(1);
    }

    fn listen_resize(&mut self) {
        self.listening = true;
    }

    fn unlisten_resize(&mut self) {
        self.listening = false;
        self.pending.clear();
    }

    fn is_listening(&self) -> bool {
        self.listening
    }

    fn poll_resize(&mut self) -> Option<SurfaceSize> {
        self.pending.pop_front()
    }
}

/// A live mount: the host with its attached backend and the stage drawn into it.
///
/// Dropping the value without [`unmount`] leaks the attachment on the host;
/// unmount consumes the mount and returns the host.
///
/// [`unmount`]: Mounted::unmount
pub struct Mounted<H: SurfaceHost> {
    host: H,
    backend: H::Backend,
    stage: Stage,
    frames: FrameLoop,
    load_token: CancelToken,
}

impl<H: SurfaceHost> Mounted<H> {
    /// Create the stage, attach one surface and start listening for resizes.
    pub fn mount(mut host: H, config: ShowcaseConfig) -> Result<Self, StageError> {
        let size = host.size();
        let settings = config.renderer_settings();
        let stage = Stage::new(config, size)?;
        let backend = host.attach(settings)?;
        host.listen_resize();
        tracing::info!(width = size.width, height = size.height, "mounted");
        Ok(Self {
            host,
            backend,
            stage,
            frames: FrameLoop::new(),
            load_token: CancelToken::new(),
        })
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut Stage {
        &mut self.stage
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn backend(&self) -> &H::Backend {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut H::Backend {
        &mut self.backend
    }

    pub fn frame_loop(&self) -> &FrameLoop {
        &self.frames
    }

    /// The load for this mount; cancelled on unmount.
    pub fn load_pipeline(&self) -> LoadPipeline {
        LoadPipeline::new(self.stage.config().clone(), self.load_token.clone())
    }

    /// Resize camera and backend. Ignored unless the host is listening.
    pub fn resize(&mut self, size: SurfaceSize) -> bool {
        if !self.host.is_listening() {
            return false;
        }
        let size = SurfaceSize::new(size.width, size.height);
        tracing::debug!(width = size.width, height = size.height, "resize");
        self.stage.resize(size);
        self.backend.resize(size);
        true
    }

    pub fn apply(&mut self, event: LoadEvent) -> Result<(), StageError> {
        self.stage.apply(event)
    }

    /// One iteration of the frame loop: pending resizes, controller damping,
    /// then render. `None` once the loop is cancelled.
    pub fn frame(&mut self) -> Result<Option<<H::Backend as RenderBackend>::Output>, StageError> {
        if !self.frames.is_running() {
            return Ok(None);
        }
        while let Some(size) = self.host.poll_resize() {
            self.resize(size);
        }
        self.stage.update();
        self.frames.tick();
        let output = self.backend.render(&self.stage.frame_input())?;
        Ok(Some(output))
    }

    /// Cancel the frame loop and the load, stop listening, release the
    /// backend and detach the surface.
    pub fn unmount(self) -> H {
        let Mounted {
            mut host,
            mut backend,
            frames,
            load_token,
            ..
        } = self;
        frames.cancel();
        load_token.cancel();
        host.unlisten_resize();
        backend.dispose();
        host.detach(backend);
        tracing::info!(frames = frames.frames(), "unmounted");
        host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{LoadOrder, LoadStage};
    use crate::testing::MemorySource;

    fn mount(host: HeadlessHost) -> Mounted<HeadlessHost> {
        Mounted::mount(host, ShowcaseConfig::default()).unwrap()
    }

    fn load(mounted: &mut Mounted<HeadlessHost>, source: &MemorySource) {
        let pipeline = mounted.load_pipeline();
        let mut events = Vec::new();
        pollster::block_on(pipeline.run(source, &mut events));
        for event in events {
            mounted.apply(event).unwrap();
        }
    }

    #[test]
    fn mount_attaches_exactly_one_surface() {
        let mounted = mount(HeadlessHost::new(SurfaceSize::new(640, 480)));
        assert_eq!(mounted.host().attached_surfaces(), 1);
        assert!(mounted.host().is_listening());
        assert!(!mounted.backend().is_disposed());

        let host = mounted.unmount();
        assert_eq!(host.attached_surfaces(), 0);
        assert_eq!(host.released(), 1);
        assert!(!host.is_listening());
    }

    #[test]
    fn second_attach_is_refused() {
        let mut host = HeadlessHost::default();
        let _backend = host.attach(RendererSettings::default()).unwrap();
        assert!(matches!(
            host.attach(RendererSettings::default()),
            Err(HostError::AlreadyAttached)
        ));
    }

    #[test]
    fn repeated_mounts_leak_nothing() {
        let mut host = HeadlessHost::default();
        for _ in 0..5 {
            let mut mounted = mount(host);
            mounted.frame().unwrap();
            host = mounted.unmount();
            assert_eq!(host.attached_surfaces(), 0);
        }
        assert_eq!(host.mounts(), 5);
        assert_eq!(host.released(), 5);
    }

    #[test]
    fn text_never_precedes_model() {
        for order in [LoadOrder::Sequential, LoadOrder::Concurrent] {
            for delay in [0, 3, 30] {
                let config = ShowcaseConfig {
                    load_order: order,
                    ..ShowcaseConfig::default()
                };
                let mut mounted = Mounted::mount(HeadlessHost::default(), config).unwrap();
                let source = MemorySource::complete()
                    .with_delay("model-transformed.glb", delay)
                    .with_delay("environment.hdr", 30 - delay);
                load(&mut mounted, &source);

                let scene = mounted.stage().scene();
                let model = scene.position_of("Base Model").unwrap();
                let text = scene.position_of("InfoText").unwrap();
                assert!(model < text, "{order:?} with delay {delay}");
            }
        }
    }

    #[test]
    fn model_failure_keeps_rendering_with_one_diagnostic() {
        let mut mounted = mount(HeadlessHost::default());
        let source = MemorySource::complete().without("model-transformed.glb");
        load(&mut mounted, &source);

        let stage = mounted.stage();
        assert!(stage.scene().find_by_name("Base Model").is_none());
        assert!(stage.scene().find_by_name("InfoText").is_none());
        assert_eq!(stage.diagnostics().len(), 1);
        assert_eq!(stage.diagnostics().entries()[0].stage, LoadStage::Model);
        assert!(!stage.overlay().loading);

        for _ in 0..3 {
            assert!(mounted.frame().unwrap().is_some());
        }
        assert_eq!(mounted.backend().frames(), 3);
    }

    #[test]
    fn successful_load_populates_scene_once() {
        for order in [LoadOrder::Sequential, LoadOrder::Concurrent] {
            let config = ShowcaseConfig {
                load_order: order,
                ..ShowcaseConfig::default()
            };
            let mut mounted = Mounted::mount(HeadlessHost::default(), config).unwrap();
            load(&mut mounted, &MemorySource::complete().with_delay("environment.hdr", 5));

            let stage = mounted.stage();
            let scene = stage.scene();
            assert_eq!(scene.ambient_lights().count(), 1);
            assert_eq!(scene.nodes().iter().filter(|n| n.name == "Base Model").count(), 1);
            assert_eq!(scene.nodes().iter().filter(|n| n.name == "InfoText").count(), 1);
            let sets = |e: &showcase_scene::SceneEvent| {
                matches!(
                    e,
                    showcase_scene::SceneEvent::BackgroundSet
                        | showcase_scene::SceneEvent::EnvironmentSet
                )
            };
            assert_eq!(scene.events().iter().filter(|e| sets(e)).count(), 2);
            assert!(stage.diagnostics().is_empty());
            assert!(!stage.overlay().loading);

            let frame = mounted.frame().unwrap().unwrap();
            assert!(frame.contains("Base Model"));
            assert!(frame.contains("InfoText"));
        }
    }

    #[test]
    fn resize_updates_camera_and_backend_until_unmount() {
        let mut mounted = mount(HeadlessHost::new(SurfaceSize::new(800, 600)));
        assert!(mounted.host_mut().resize(SurfaceSize::new(1200, 400)));
        mounted.frame().unwrap();
        assert!((mounted.stage().camera().aspect - 3.0).abs() < 1e-6);
        assert_eq!(mounted.backend().size(), SurfaceSize::new(1200, 400));

        assert!(mounted.resize(SurfaceSize::new(0, 0)));
        assert_eq!(mounted.backend().size(), SurfaceSize::new(1, 1));

        let mut host = mounted.unmount();
        assert!(!host.resize(SurfaceSize::new(300, 300)));
        assert!(host.poll_resize().is_none());
    }

    #[test]
    fn unmount_cancels_pending_load() {
        let mounted = mount(HeadlessHost::default());
        let pipeline = mounted.load_pipeline();
        let _host = mounted.unmount();

        let mut events = Vec::new();
        pollster::block_on(pipeline.run(&MemorySource::complete(), &mut events));
        assert!(events.is_empty());
    }
}
