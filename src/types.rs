//! Vertex and per-instance data types, plus the attribute layout that binds
//! them to shader slots.

use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Attribute slot of [`Vertex::pos`].
pub const POS_ATTRIB: u32 = 0;
/// Attribute slot of [`Vertex::rgba`].
pub const COLOR_ATTRIB: u32 = 1;
/// Attribute slot of the per-instance scale-rotation matrix.
pub const SCALEROT_ATTRIB: u32 = 2;
/// Attribute slot of the per-instance offset.
pub const OFFSET_ATTRIB: u32 = 3;

/// Number of vertices in [`QUAD`], drawn as a triangle strip.
pub const QUAD_VERTEX_COUNT: u32 = 4;

/// A corner of the shared sprite quad.
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    /// Corner position before the instance transform.
    pub pos: [f32; 2],
    /// Fetched as normalized unsigned bytes.
    pub rgba: [u8; 4],
}

/// The quad every instance draws, in triangle-strip order.
pub const QUAD: [Vertex; 4] = [
    Vertex {
        pos: [-0.7, -0.7],
        rgba: [0x00, 0xFF, 0x00, 0xFF],
    },
    Vertex {
        pos: [0.7, -0.7],
        rgba: [0x00, 0x00, 0xFF, 0xFF],
    },
    Vertex {
        pos: [-0.7, 0.7],
        rgba: [0xFF, 0x00, 0x00, 0xFF],
    },
    Vertex {
        pos: [0.7, 0.7],
        rgba: [0xFF, 0xFF, 0xFF, 0xFF],
    },
];

/// A 2×2 scale-rotation matrix stored column-major as `(a, b, c, d)`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(transparent)]
pub struct InstanceTransform(pub [f32; 4]);

impl InstanceTransform {
    /// Unscaled, unrotated.
    pub const IDENTITY: Self = Self([1.0, 0.0, 0.0, 1.0]);

    /// Rotation by `angle` radians followed by a per-axis scale.
    #[must_use]
    pub fn rotation_scale(angle: f32, scale: [f32; 2]) -> Self {
        let (s, c) = angle.sin_cos();
        Self([c * scale[0], s * scale[1], -s * scale[0], c * scale[1]])
    }
}

/// Clip-space translation of one instance.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(transparent)]
pub struct InstanceOffset(pub [f32; 2]);

/// The two buffers written per frame by the caller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InstanceBuffer {
    /// Holds [`InstanceTransform`]s.
    Transform,
    /// Holds [`InstanceOffset`]s.
    Offset,
}

impl InstanceBuffer {
    pub(crate) const ALL: [Self; 2] = [Self::Transform, Self::Offset];

    pub(crate) fn index(self) -> usize {
        match self {
            Self::Transform => 0,
            Self::Offset => 1,
        }
    }
}

impl fmt::Display for InstanceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transform => "transform",
            Self::Offset => "offset",
        })
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::InstanceTransform {}
    impl Sealed for super::InstanceOffset {}
}

/// Per-instance data that lives in one of the mapped buffers.
///
/// Sealed: the renderer sizes each buffer for exactly these two types, so
/// mapping any other type would misread its storage.
///
/// ```compile_fail
/// use gles3_instanced_sprites::{InstanceBuffer, InstanceData};
///
/// #[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
/// #[repr(transparent)]
/// struct Wide([f32; 8]);
///
/// impl InstanceData for Wide {
///     const BUFFER: InstanceBuffer = InstanceBuffer::Transform;
/// }
/// ```
pub trait InstanceData: Pod + sealed::Sealed {
    /// Which buffer holds values of this type.
    const BUFFER: InstanceBuffer;
}

impl InstanceData for InstanceTransform {
    const BUFFER: InstanceBuffer = InstanceBuffer::Transform;
}

impl InstanceData for InstanceOffset {
    const BUFFER: InstanceBuffer = InstanceBuffer::Offset;
}

/// Component type of a vertex attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttribKind {
    /// 32-bit floats.
    Float,
    /// Unsigned bytes mapped to `[0, 1]`.
    NormalizedU8,
}

/// How one shader input reads from its buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VertexAttrib {
    /// Shader input location.
    pub slot: u32,
    /// Components per element (1 to 4).
    pub components: u32,
    /// Component type.
    pub kind: AttribKind,
    /// Bytes between consecutive elements.
    pub stride: u32,
    /// Byte offset of the first element.
    pub offset: u32,
    /// `0` advances per vertex, `1` once per instance.
    pub divisor: u32,
}

#[expect(clippy::cast_possible_truncation)] // struct sizes are tiny
const fn size_of_u32<T>() -> u32 {
    std::mem::size_of::<T>() as u32
}

/// Position read from the quad buffer.
pub const POS_LAYOUT: VertexAttrib = VertexAttrib {
    slot: POS_ATTRIB,
    components: 2,
    kind: AttribKind::Float,
    stride: size_of_u32::<Vertex>(),
    offset: 0,
    divisor: 0,
};

/// Color read from the quad buffer.
pub const COLOR_LAYOUT: VertexAttrib = VertexAttrib {
    slot: COLOR_ATTRIB,
    components: 4,
    kind: AttribKind::NormalizedU8,
    stride: size_of_u32::<Vertex>(),
    offset: size_of_u32::<[f32; 2]>(),
    divisor: 0,
};

/// Scale-rotation read from the transform buffer, once per instance.
pub const SCALEROT_LAYOUT: VertexAttrib = VertexAttrib {
    slot: SCALEROT_ATTRIB,
    components: 4,
    kind: AttribKind::Float,
    stride: size_of_u32::<InstanceTransform>(),
    offset: 0,
    divisor: 1,
};

/// Offset read from the offset buffer, once per instance.
pub const OFFSET_LAYOUT: VertexAttrib = VertexAttrib {
    slot: OFFSET_ATTRIB,
    components: 2,
    kind: AttribKind::Float,
    stride: size_of_u32::<InstanceOffset>(),
    offset: 0,
    divisor: 1,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_twelve_bytes() {
        assert_eq!(std::mem::size_of::<Vertex>(), 12);
        assert_eq!(POS_LAYOUT.stride, 12);
        assert_eq!(COLOR_LAYOUT.offset, 8);
    }

    #[test]
    fn instance_layouts_advance_per_instance() {
        assert_eq!(SCALEROT_LAYOUT.divisor, 1);
        assert_eq!(OFFSET_LAYOUT.divisor, 1);
        assert_eq!(SCALEROT_LAYOUT.stride, 16);
        assert_eq!(OFFSET_LAYOUT.stride, 8);
        assert_eq!(POS_LAYOUT.divisor, 0);
        assert_eq!(COLOR_LAYOUT.divisor, 0);
    }

    #[test]
    fn rotation_scale_zero_angle_is_scale() {
        let t = InstanceTransform::rotation_scale(0.0, [2.0, 3.0]);
        assert_eq!(t, InstanceTransform([2.0, 0.0, -0.0, 3.0]));
    }

    #[test]
    fn rotation_scale_quarter_turn() {
        let t = InstanceTransform::rotation_scale(std::f32::consts::FRAC_PI_2, [1.0, 1.0]);
        let expected = [0.0, 1.0, -1.0, 0.0];
        for (a, b) in t.0.iter().zip(expected) {
            assert!((a - b).abs() < 1e-6, "{t:?}");
        }
    }

    #[test]
    fn instance_data_matches_its_layout() {
        assert_eq!(size_of_u32::<InstanceTransform>(), SCALEROT_LAYOUT.stride);
        assert_eq!(size_of_u32::<InstanceOffset>(), OFFSET_LAYOUT.stride);
        assert_eq!(InstanceTransform::BUFFER, InstanceBuffer::Transform);
        assert_eq!(InstanceOffset::BUFFER, InstanceBuffer::Offset);
    }

    #[test]
    fn quad_is_static_strip() {
        assert_eq!(QUAD.len(), QUAD_VERTEX_COUNT as usize);
        assert_eq!(QUAD[0].pos, [-0.7, -0.7]);
        assert_eq!(QUAD[3].rgba, [0xFF; 4]);
    }
}
