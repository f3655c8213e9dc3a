/// Bindings shared by every pipeline: camera, lighting and the environment map.
const COMMON: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    inv_view_proj: mat4x4<f32>,
    // w: 1.0 when an environment map is bound
    eye: vec4<f32>,
    ambient: vec4<f32>,
    env_average: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> camera: Camera;
@group(0) @binding(1)
var env_tex: texture_2d<f32>;
@group(0) @binding(2)
var env_sampler: sampler;

const PI: f32 = 3.14159265359;

fn equirect_uv(dir: vec3<f32>) -> vec2<f32> {
    let d = normalize(dir);
    let u = atan2(d.z, d.x) / (2.0 * PI) + 0.5;
    let v = 0.5 - asin(clamp(d.y, -1.0, 1.0)) / PI;
    return vec2<f32>(u, v);
}
"#;

/// Equirectangular panorama drawn behind everything with a fullscreen triangle.
const BACKGROUND: &str = r#"
struct BackgroundOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) ndc: vec2<f32>,
};

@vertex
fn vs_background(@builtin(vertex_index) index: u32) -> BackgroundOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    let ndc = uv * 2.0 - 1.0;
    var out: BackgroundOutput;
    out.clip_position = vec4<f32>(ndc, 1.0, 1.0);
    out.ndc = ndc;
    return out;
}

@fragment
fn fs_background(in: BackgroundOutput) -> @location(0) vec4<f32> {
    let far = camera.inv_view_proj * vec4<f32>(in.ndc, 1.0, 1.0);
    let near = camera.inv_view_proj * vec4<f32>(in.ndc, 0.0, 1.0);
    let dir = far.xyz / far.w - near.xyz / near.w;
    let color = textureSampleLevel(env_tex, env_sampler, equirect_uv(dir), 0.0).rgb;
    return vec4<f32>(color, 1.0);
}
"#;

/// Metallic-roughness surfaces lit by the ambient light and environment
/// reflections, with the base colour scaled by the material texture (white
/// when untextured). Shared by the triangle and wireframe pipelines.
const MESH: &str = r#"
struct Mesh {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
    color: vec4<f32>,
    // x: metalness, y: roughness, z: env map intensity
    params: vec4<f32>,
};

@group(1) @binding(0)
var<uniform> mesh: Mesh;
@group(1) @binding(1)
var base_tex: texture_2d<f32>;
@group(1) @binding(2)
var base_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

@vertex
fn vs_mesh(vertex: VertexInput) -> VertexOutput {
    let world_pos = mesh.model * vec4<f32>(vertex.position, 1.0);
    var out: VertexOutput;
    out.clip_position = camera.view_proj * world_pos;
    out.world_pos = world_pos.xyz;
    out.world_normal = (mesh.normal_matrix * vec4<f32>(vertex.normal, 0.0)).xyz;
    out.uv = vertex.uv;
    return out;
}

@fragment
fn fs_mesh(in: VertexOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(base_tex, base_sampler, in.uv);
    let n = normalize(in.world_normal);
    let v = normalize(camera.eye.xyz - in.world_pos);
    let r = reflect(-v, n);

    let base = mesh.color.rgb * texel.rgb;
    let metalness = mesh.params.x;
    let roughness = mesh.params.y;
    let env_intensity = mesh.params.z * camera.eye.w;

    let reflected = textureSampleLevel(env_tex, env_sampler, equirect_uv(r), 0.0).rgb;
    let f0 = mix(vec3<f32>(0.04), base, metalness);
    let fresnel = f0 + (vec3<f32>(1.0) - f0) * pow(1.0 - max(dot(n, v), 0.0), 5.0);
    let specular = reflected * fresnel * env_intensity * (1.0 - 0.7 * roughness);
    let irradiance = camera.ambient.rgb + camera.env_average.rgb * env_intensity;
    let diffuse = base * (1.0 - metalness) * irradiance / PI;
    return vec4<f32>(diffuse + specular + base * metalness * camera.ambient.rgb * 0.1, 1.0);
}
"#;

pub fn background_shader() -> String {
    format!("{COMMON}{BACKGROUND}")
}

pub fn mesh_shader() -> String {
    format!("{COMMON}{MESH}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shaders_share_camera_bindings() {
        for src in [background_shader(), mesh_shader()] {
            assert!(src.contains("var<uniform> camera: Camera"));
            assert!(src.contains("fn equirect_uv"));
        }
        assert!(mesh_shader().contains("fn vs_mesh"));
        assert!(background_shader().contains("fn fs_background"));
    }

    #[test]
    fn mesh_shader_samples_base_color_texture() {
        let src = mesh_shader();
        assert!(src.contains("@group(1) @binding(1)\nvar base_tex: texture_2d<f32>"));
        assert!(src.contains("@group(1) @binding(2)\nvar base_sampler: sampler"));
        assert!(src.contains("@location(2) uv: vec2<f32>"));
        assert!(src.contains("mesh.color.rgb * texel.rgb"));
        assert!(!background_shader().contains("base_tex"));
    }
}
