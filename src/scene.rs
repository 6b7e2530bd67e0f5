//! A grid of spinning sprites driven through [`InstancedSpriteRenderer`].
//!
//! The viewport is divided into square cells along its longer side; every
//! cell holds one instance that spins at its own random speed.

use std::f32::consts::TAU;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::{
    backend::GlBackend,
    config::RendererConfig,
    error::{ConfigError, RendererError},
    render::InstancedSpriteRenderer,
    types::{InstanceOffset, InstanceTransform},
};

/// Instance placement for one viewport size.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    /// One offset per instance, cells along the major axis outermost.
    pub offsets: Vec<InstanceOffset>,
    /// Clip-space half-extent of a cell, `[x, y]`.
    pub scale: [f32; 2],
}

/// Place up to `per_side` cells along the longer side of a `width` ×
/// `height` viewport and as many whole cells as fit along the shorter side.
///
/// A zero-sized viewport yields no instances.
#[must_use]
#[expect(clippy::cast_precision_loss)] // viewport sizes and cell counts are small
pub fn grid_layout(width: u32, height: u32, per_side: u32) -> GridLayout {
    if width == 0 || height == 0 || per_side == 0 {
        return GridLayout {
            offsets: Vec::new(),
            scale: [0.0, 0.0],
        };
    }

    // Computed in landscape; swapped at the end for portrait viewports.
    let ncells_major = per_side as f32;
    let cell_size = 2.0 / ncells_major;
    let dim = [width.max(height) as f32, width.min(height) as f32];
    let aspect = [dim[0] / dim[1], dim[1] / dim[0]];
    let scene_to_clip = [1.0, aspect[0]];
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let ncells = [per_side, (ncells_major * aspect[1]).floor() as u32];

    let centers: [Vec<f32>; 2] = std::array::from_fn(|d| {
        let origin = -(ncells[d] as f32) / ncells_major;
        (0..ncells[d])
            .map(|i| scene_to_clip[d] * (cell_size * (i as f32 + 0.5) + origin))
            .collect()
    });

    let (major, minor) = if width >= height { (0, 1) } else { (1, 0) };
    let mut offsets = Vec::with_capacity(centers[0].len() * centers[1].len());
    for &a in &centers[0] {
        for &b in &centers[1] {
            let mut offset = [0.0; 2];
            offset[major] = a;
            offset[minor] = b;
            offsets.push(InstanceOffset(offset));
        }
    }

    let mut scale = [0.0; 2];
    scale[major] = 0.5 * cell_size * scene_to_clip[0];
    scale[minor] = 0.5 * cell_size * scene_to_clip[1];

    GridLayout { offsets, scale }
}

/// Owns a renderer and animates a grid of instances on it.
///
/// Call [`resize`](Self::resize) whenever the surface size changes (and once
/// before the first frame), then [`render`](Self::render) every frame.
pub struct SpriteScene<B: GlBackend> {
    renderer: InstancedSpriteRenderer<B>,
    config: RendererConfig,
    rng: StdRng,
    /// Half-extent of a cell, applied to every transform.
    scale: [f32; 2],
    angles: Vec<f32>,
    angular_velocity: Vec<f32>,
    last_frame: Option<Instant>,
}

/// Errors from building a [`SpriteScene`].
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The renderer failed to initialize.
    #[error(transparent)]
    Renderer(#[from] RendererError),
}

impl<B: GlBackend> SpriteScene<B> {
    /// Validate `config`, then create and initialize a renderer on `backend`.
    ///
    /// # Errors
    ///
    /// [`SceneError::Config`] for an invalid config, [`SceneError::Renderer`]
    /// if renderer initialization fails (its partial resources are released).
    pub fn new(backend: B, config: RendererConfig) -> Result<Self, SceneError> {
        config.validate()?;
        let mut renderer = InstancedSpriteRenderer::new(backend, config.max_instances);
        renderer.initialize()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            renderer,
            config,
            rng,
            scale: [0.0; 2],
            angles: Vec::new(),
            angular_velocity: Vec::new(),
            last_frame: None,
        })
    }

    /// Number of instances drawn per frame.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.angles.len()
    }

    /// Current angle of each instance, in radians.
    #[must_use]
    pub fn angles(&self) -> &[f32] {
        &self.angles
    }

    /// The renderer this scene draws with.
    pub fn renderer(&self) -> &InstancedSpriteRenderer<B> {
        &self.renderer
    }

    /// Lay out the grid for a new surface size, re-randomize the spin of every
    /// instance, and restart the frame clock.
    ///
    /// # Errors
    ///
    /// Propagates renderer errors from writing offsets or setting the
    /// viewport.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RendererError> {
        let layout = grid_layout(width, height, self.config.instances_per_side);
        self.renderer.write_offsets(&layout.offsets)?;
        self.scale = layout.scale;

        let count = layout.offsets.len();
        let max_speed = self.config.max_rotation_speed;
        self.angles = (0..count).map(|_| self.rng.gen::<f32>() * TAU).collect();
        self.angular_velocity = (0..count)
            .map(|_| max_speed * (2.0 * self.rng.gen::<f32>() - 1.0))
            .collect();
        self.last_frame = None;

        self.renderer.set_viewport(width, height)?;
        debug!(width, height, instances = count, "scene resized");
        Ok(())
    }

    /// Advance every instance by the time since the previous step and upload
    /// the new transforms. The first step after a resize uploads the starting
    /// angles without advancing them.
    ///
    /// # Errors
    ///
    /// Propagates renderer errors from writing transforms.
    pub fn step(&mut self, now: Instant) -> Result<(), RendererError> {
        if let Some(last) = self.last_frame {
            let dt = now.saturating_duration_since(last).as_secs_f32();
            self.advance(dt);
        }

        let scale = self.scale;
        let transforms = self.renderer.map_transforms()?;
        for (slot, &angle) in transforms.iter_mut().zip(&self.angles) {
            *slot = InstanceTransform::rotation_scale(angle, scale);
        }
        self.renderer.unmap_transforms()?;

        self.last_frame = Some(now);
        Ok(())
    }

    /// Step, clear, and draw one frame.
    ///
    /// # Errors
    ///
    /// Propagates renderer errors.
    pub fn render(&mut self, now: Instant) -> Result<(), RendererError> {
        self.step(now)?;
        self.renderer.clear(self.config.clear_color)?;
        let count = u32::try_from(self.instance_count()).map_err(|_| {
            RendererError::CapacityExceeded {
                requested: self.instance_count(),
                capacity: self.renderer.capacity(),
            }
        })?;
        self.renderer.draw(count)
    }

    fn advance(&mut self, dt: f32) {
        for (angle, velocity) in self.angles.iter_mut().zip(&self.angular_velocity) {
            *angle = wrap_angle(*angle + velocity * dt);
        }
    }
}

/// Bring an angle that has drifted past a full turn back into `(-2π, 2π)`.
fn wrap_angle(angle: f32) -> f32 {
    if angle >= TAU {
        angle - TAU
    } else if angle <= -TAU {
        angle + TAU
    } else {
        angle
    }
}
