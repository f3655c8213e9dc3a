use crate::action::{Action, MouseBindings, PointerButton};
use crate::touch::{TouchGesture, TouchTracker};
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use showcase_common::SurfaceSize;
use showcase_render::PerspectiveCamera;
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI, TAU};

const EPS: f32 = 1e-6;

/// Bounds the controller enforces on every update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitLimits {
    pub min_distance: f32,
    pub max_distance: f32,
    /// Polar angle from +Y, radians.
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
}

impl Default for OrbitLimits {
    fn default() -> Self {
        Self {
            min_distance: 10.0,
            max_distance: 35.0,
            min_polar_angle: FRAC_PI_4,
            max_polar_angle: FRAC_PI_2 - 0.2,
        }
    }
}

/// Spherical coordinates around +Y: `theta` is the azimuth from +Z toward
/// +X, `phi` the polar angle from +Y.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Spherical {
    radius: f32,
    theta: f32,
    phi: f32,
}

impl Spherical {
    fn from_offset(v: Vec3) -> Self {
        let radius = v.length();
        if radius == 0.0 {
            return Self::default();
        }
        Self {
            radius,
            theta: v.x.atan2(v.z),
            phi: (v.y / radius).clamp(-1.0, 1.0).acos(),
        }
    }

    fn to_offset(self) -> Vec3 {
        let sin_phi_radius = self.phi.sin() * self.radius;
        Vec3::new(
            sin_phi_radius * self.theta.sin(),
            self.phi.cos() * self.radius,
            sin_phi_radius * self.theta.cos(),
        )
    }

    /// Keep `phi` off the poles so the view basis stays defined.
    fn make_safe(&mut self) {
        self.phi = self.phi.clamp(EPS, PI - EPS);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Drag {
    action: Action,
    last: Vec2,
}

/// Orbit camera controller: rotate, pan and dolly around a target point.
///
/// Input handlers only accumulate deltas; [`update`] applies them to the
/// camera, clamps distance and polar angle, and with damping enabled lets
/// the remaining motion decay over subsequent frames.
///
/// [`update`]: OrbitControls::update
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub limits: OrbitLimits,
    pub bindings: MouseBindings,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub enable_rotate: bool,
    pub enable_pan: bool,
    pub enable_zoom: bool,
    pub rotate_speed: f32,
    pub pan_speed: f32,
    pub zoom_speed: f32,
    viewport: SurfaceSize,
    spherical_delta: Spherical,
    scale: f32,
    pan_offset: Vec3,
    drag: Option<Drag>,
    touches: TouchTracker,
    last_position: Option<Vec3>,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            limits: OrbitLimits::default(),
            bindings: MouseBindings::default(),
            enable_damping: true,
            damping_factor: 0.05,
            enable_rotate: true,
            enable_pan: true,
            enable_zoom: true,
            rotate_speed: 1.0,
            pan_speed: 1.0,
            zoom_speed: 1.0,
            viewport: SurfaceSize::default(),
            spherical_delta: Spherical::default(),
            scale: 1.0,
            pan_offset: Vec3::ZERO,
            drag: None,
            touches: TouchTracker::new(),
            last_position: None,
        }
    }
}

impl OrbitControls {
    pub fn new(limits: OrbitLimits, bindings: MouseBindings) -> Self {
        Self {
            limits,
            bindings,
            ..Self::default()
        }
    }

    /// Pixel size of the element receiving input; drags scale by its height.
    pub fn set_viewport(&mut self, size: SurfaceSize) {
        self.viewport = size;
    }

    pub fn viewport(&self) -> SurfaceSize {
        self.viewport
    }

    /// True while damped motion is still being applied.
    pub fn is_settling(&self) -> bool {
        self.spherical_delta.theta.abs() > EPS
            || self.spherical_delta.phi.abs() > EPS
            || self.pan_offset.length_squared() > EPS * EPS
    }

    pub fn dragging(&self) -> Option<Action> {
        self.drag.map(|d| d.action)
    }

    /// Apply pending motion to `camera`. Returns whether the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let offset = camera.position - self.target;
        let mut spherical = Spherical::from_offset(offset);

        if self.enable_damping {
            spherical.theta += self.spherical_delta.theta * self.damping_factor;
            spherical.phi += self.spherical_delta.phi * self.damping_factor;
        } else {
            spherical.theta += self.spherical_delta.theta;
            spherical.phi += self.spherical_delta.phi;
        }

        spherical.phi = spherical
            .phi
            .clamp(self.limits.min_polar_angle, self.limits.max_polar_angle);
        spherical.make_safe();

        spherical.radius = (spherical.radius * self.scale)
            .clamp(self.limits.min_distance, self.limits.max_distance);

        if self.enable_damping {
            self.target += self.pan_offset * self.damping_factor;
        } else {
            self.target += self.pan_offset;
        }

        camera.position = self.target + spherical.to_offset();
        camera.look_at(self.target);

        if self.enable_damping {
            let keep = 1.0 - self.damping_factor;
            self.spherical_delta.theta *= keep;
            self.spherical_delta.phi *= keep;
            self.pan_offset *= keep;
        } else {
            self.spherical_delta = Spherical::default();
            self.pan_offset = Vec3::ZERO;
        }
        let zoomed = self.scale != 1.0;
        self.scale = 1.0;

        let moved = self
            .last_position
            .is_none_or(|last| last.distance_squared(camera.position) > EPS);
        self.last_position = Some(camera.position);
        moved || zoomed
    }

    pub fn pointer_down(&mut self, button: PointerButton, position: Vec2) {
        let Some(action) = self.bindings.action_for(button) else {
            return;
        };
        let enabled = match action {
            Action::Rotate => self.enable_rotate,
            Action::Pan => self.enable_pan,
            Action::Dolly => self.enable_zoom,
        };
        if enabled {
            tracing::trace!(?button, ?action, "drag started");
            self.drag = Some(Drag {
                action,
                last: position,
            });
        }
    }

    pub fn pointer_move(&mut self, position: Vec2, camera: &PerspectiveCamera) {
        let Some(drag) = self.drag.as_mut() else {
            return;
        };
        let delta = position - drag.last;
        drag.last = position;
        match drag.action {
            Action::Rotate => self.rotate_by(delta * self.rotate_speed),
            Action::Pan => self.pan_by(delta * self.pan_speed, camera),
            Action::Dolly => {
                if delta.y > 0.0 {
                    self.dolly_out(self.zoom_scale());
                } else if delta.y < 0.0 {
                    self.dolly_in(self.zoom_scale());
                }
            }
        }
    }

    pub fn pointer_up(&mut self, button: PointerButton) {
        if self.bindings.action_for(button) == self.dragging() {
            self.drag = None;
        }
    }

    /// Scroll wheel: negative `delta_y` (scrolling up) moves closer.
    pub fn wheel(&mut self, delta_y: f32) {
        if !self.enable_zoom || self.drag.is_some() {
            return;
        }
        if delta_y < 0.0 {
            self.dolly_in(self.zoom_scale());
        } else if delta_y > 0.0 {
            self.dolly_out(self.zoom_scale());
        }
    }

    pub fn touch_start(&mut self, id: u64, position: Vec2) {
        self.touches.start(id, position);
    }

    pub fn touch_move(&mut self, id: u64, position: Vec2, camera: &PerspectiveCamera) {
        match self.touches.moved(id, position) {
            Some(TouchGesture::Rotate { delta }) if self.enable_rotate => {
                self.rotate_by(delta * self.rotate_speed);
            }
            Some(TouchGesture::DollyPan { scale, pan }) => {
                if self.enable_zoom && scale > 0.0 {
                    self.dolly_out(scale.powf(self.zoom_speed));
                }
                if self.enable_pan {
                    self.pan_by(pan * self.pan_speed, camera);
                }
            }
            _ => {}
        }
    }

    pub fn touch_end(&mut self, id: u64) {
        self.touches.end(id);
    }

    /// Drop any drag in progress, e.g. when the cursor leaves the window.
    pub fn cancel(&mut self) {
        self.drag = None;
        self.touches.clear();
    }

    fn zoom_scale(&self) -> f32 {
        0.95f32.powf(self.zoom_speed)
    }

    fn dolly_in(&mut self, scale: f32) {
        self.scale *= scale;
    }

    fn dolly_out(&mut self, scale: f32) {
        self.scale /= scale;
    }

    fn rotate_by(&mut self, delta: Vec2) {
        let height = self.viewport.height as f32;
        self.spherical_delta.theta -= TAU * delta.x / height;
        self.spherical_delta.phi -= TAU * delta.y / height;
    }

    /// Screen-space pan: one viewport height of drag moves the target by the
    /// visible height at the target's depth.
    fn pan_by(&mut self, delta: Vec2, camera: &PerspectiveCamera) {
        let height = self.viewport.height as f32;
        let distance = (camera.position - self.target).length() * (camera.fov_radians() / 2.0).tan();
        let basis = camera.world_matrix();
        let left = basis.col(0).truncate() * -(2.0 * delta.x * distance / height);
        let up = basis.col(1).truncate() * (2.0 * delta.y * distance / height);
        self.pan_offset += left + up;
    }
}
