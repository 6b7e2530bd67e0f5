//! GLSL sources for the sprite program and the glow compile helper.
//!
//! Both stages target GLSL ES 3.00 (OpenGL ES 3.0). Attribute locations are
//! fixed in the source and must agree with the slots in [`crate::types`].

#[cfg(feature = "glow")]
use glow::HasContext;

/// Vertex shader.
///
/// Each vertex of the shared quad is transformed by its instance's 2×2
/// scale-rotation matrix and then translated by the instance offset.
///
/// | Location | Input      | Rate         |
/// |----------|------------|--------------|
/// | 0        | `pos`      | per vertex   |
/// | 1        | `color`    | per vertex   |
/// | 2        | `scaleRot` | per instance |
/// | 3        | `offset`   | per instance |
pub const VERTEX_SRC: &str = r"#version 300 es
layout(location = 0) in vec2 pos;
layout(location = 1) in vec4 color;
layout(location = 2) in vec4 scaleRot;
layout(location = 3) in vec2 offset;
out vec4 vColor;
void main() {
    mat2 sr = mat2(scaleRot.xy, scaleRot.zw);
    gl_Position = vec4(sr * pos + offset, 0.0, 1.0);
    vColor = color;
}
";

/// Fragment shader. Passes the interpolated vertex color through.
pub const FRAGMENT_SRC: &str = r"#version 300 es
precision mediump float;
in vec4 vColor;
out vec4 outColor;
void main() {
    outColor = vColor;
}
";

/// Compile and link a program from vertex and fragment source strings.
///
/// Shader objects are deleted before returning on every path, so only the
/// program handle needs to be cleaned up by the caller.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
///
/// # Errors
///
/// Returns the driver's info log if a stage fails to compile or the program
/// fails to link.
#[cfg(feature = "glow")]
pub unsafe fn compile_program(
    gl: &glow::Context,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<glow::Program, String> {
    let vs = unsafe { compile_shader(gl, glow::VERTEX_SHADER, vertex_src) }?;
    let fs = match unsafe { compile_shader(gl, glow::FRAGMENT_SHADER, fragment_src) } {
        Ok(fs) => fs,
        Err(e) => {
            unsafe { gl.delete_shader(vs) };
            return Err(e);
        }
    };

    unsafe {
        let program = match gl.create_program() {
            Ok(program) => program,
            Err(e) => {
                gl.delete_shader(vs);
                gl.delete_shader(fs);
                return Err(e);
            }
        };

        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.link_program(program);
        let linked = gl.get_program_link_status(program);

        gl.detach_shader(program, vs);
        gl.detach_shader(program, fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);

        if !linked {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            tracing::warn!("sprite program failed to link:\n{log}");
            return Err(format!("Program link error: {log}"));
        }

        Ok(program)
    }
}

/// Compile a single shader stage from source.
///
/// # Safety
///
/// Requires a valid, current OpenGL context.
#[cfg(feature = "glow")]
unsafe fn compile_shader(
    gl: &glow::Context,
    shader_type: u32,
    source: &str,
) -> Result<glow::Shader, String> {
    unsafe {
        let shader = gl.create_shader(shader_type)?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);

        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            let stage = if shader_type == glow::VERTEX_SHADER {
                "vertex"
            } else {
                "fragment"
            };
            tracing::warn!("{stage} shader failed to compile:\n{log}");
            return Err(format!("Shader compile error ({stage}): {log}"));
        }

        Ok(shader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{COLOR_ATTRIB, OFFSET_ATTRIB, POS_ATTRIB, SCALEROT_ATTRIB};

    #[test]
    fn vertex_locations_match_attribute_slots() {
        for (slot, name) in [
            (POS_ATTRIB, "pos"),
            (COLOR_ATTRIB, "color"),
            (SCALEROT_ATTRIB, "scaleRot"),
            (OFFSET_ATTRIB, "offset"),
        ] {
            let decl = format!("layout(location = {slot}) in");
            let line = VERTEX_SRC
                .lines()
                .find(|l| l.starts_with(&decl))
                .unwrap_or_else(|| panic!("no declaration for slot {slot}"));
            assert!(line.trim_end().ends_with(&format!("{name};")), "{line}");
        }
    }

    #[test]
    fn both_stages_target_gles3() {
        assert!(VERTEX_SRC.starts_with("#version 300 es\n"));
        assert!(FRAGMENT_SRC.starts_with("#version 300 es\n"));
    }
}
