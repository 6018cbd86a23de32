/// WGSL compute kernel: one primary ray per pixel through the flattened BVH,
/// progressively averaged into `accum` and packed into `pixels`.
///
/// Node and triangle layouts match `BvhNode` and `GpuTriangle`. The hash,
/// jitter and shading functions mirror `rtobj_render::shading`.
pub const RAYTRACE_SHADER: &str = r#"
struct Node {
    aabb_min: vec3<f32>,
    left_or_first: u32,
    aabb_max: vec3<f32>,
    count: u32,
};

struct Triangle {
    v0: vec4<f32>,
    v1: vec4<f32>,
    v2: vec4<f32>,
};

struct Camera {
    position: vec4<f32>,
    dir_00: vec4<f32>,
    du: vec4<f32>,
    dv: vec4<f32>,
};

struct Frame {
    sample: u32,
    width: u32,
    height: u32,
    shading: u32,
};

struct Hit {
    t: f32,
    prim: u32,
};

@group(0) @binding(0) var<storage, read> nodes: array<Node>;
@group(0) @binding(1) var<storage, read> triangles: array<Triangle>;
@group(0) @binding(2) var<uniform> camera: Camera;
@group(0) @binding(3) var<uniform> frame: Frame;
@group(0) @binding(4) var<storage, read_write> accum: array<vec4<f32>>;
@group(0) @binding(5) var<storage, read_write> pixels: array<u32>;

const STACK_SIZE: u32 = 64u;
const NO_HIT: f32 = 1e30;
const EPSILON: f32 = 1.1920929e-7;
const SHADING_EYE_LIGHT: u32 = 1u;

fn pcg_hash(v: u32) -> u32 {
    let state = v * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

fn unit_float(v: u32) -> f32 {
    return f32(v >> 8u) / 16777216.0;
}

fn sample_jitter(x: u32, y: u32, sample: u32) -> vec2<f32> {
    if (sample == 0u) {
        return vec2<f32>(0.5, 0.5);
    }
    let seed = pcg_hash(x ^ pcg_hash(y ^ pcg_hash(sample)));
    let a = pcg_hash(seed);
    let b = pcg_hash(a);
    return vec2<f32>(unit_float(a), unit_float(b));
}

fn safe_inverse(x: f32) -> f32 {
    if (abs(x) <= EPSILON) {
        return select(-1.0, 1.0, x >= 0.0) / EPSILON;
    }
    return 1.0 / x;
}

// Entry distance into the box, NO_HIT on a miss.
fn intersect_aabb(origin: vec3<f32>, inv_dir: vec3<f32>, bmin: vec3<f32>, bmax: vec3<f32>, t_max: f32) -> f32 {
    let t1 = (bmin - origin) * inv_dir;
    let t2 = (bmax - origin) * inv_dir;
    let lo = min(t1, t2);
    let hi = max(t1, t2);
    let t_near = max(max(lo.x, lo.y), max(lo.z, 0.0));
    let t_far = min(min(hi.x, hi.y), min(hi.z, t_max));
    if (t_far >= t_near) {
        return t_near;
    }
    return NO_HIT;
}

// Two-sided Moller-Trumbore.
fn intersect_triangle(origin: vec3<f32>, dir: vec3<f32>, tri: Triangle, t_max: f32) -> f32 {
    let v0 = tri.v0.xyz;
    let e1 = tri.v1.xyz - v0;
    let e2 = tri.v2.xyz - v0;
    let p = cross(dir, e2);
    let det = dot(e1, p);
    if (abs(det) < 1e-12) {
        return NO_HIT;
    }
    let inv_det = 1.0 / det;

    let s = origin - v0;
    let u = dot(s, p) * inv_det;
    if (u < 0.0 || u > 1.0) {
        return NO_HIT;
    }
    let q = cross(s, e1);
    let v = dot(dir, q) * inv_det;
    if (v < 0.0 || u + v > 1.0) {
        return NO_HIT;
    }

    let t = dot(e2, q) * inv_det;
    if (t >= 0.0 && t <= t_max) {
        return t;
    }
    return NO_HIT;
}

fn trace(origin: vec3<f32>, dir: vec3<f32>) -> Hit {
    var hit = Hit(NO_HIT, 0u);
    let inv_dir = vec3<f32>(safe_inverse(dir.x), safe_inverse(dir.y), safe_inverse(dir.z));

    let root = nodes[0];
    if (intersect_aabb(origin, inv_dir, root.aabb_min, root.aabb_max, NO_HIT) >= NO_HIT) {
        return hit;
    }

    var stack: array<u32, STACK_SIZE>;
    stack[0] = 0u;
    var sp = 1u;
    loop {
        if (sp == 0u) {
            break;
        }
        sp -= 1u;
        let node = nodes[stack[sp]];

        if (node.count > 0u) {
            let end = node.left_or_first + node.count;
            for (var i = node.left_or_first; i < end; i++) {
                let t = intersect_triangle(origin, dir, triangles[i], hit.t);
                if (t < hit.t) {
                    hit.t = t;
                    hit.prim = i;
                }
            }
            continue;
        }

        let left = node.left_or_first;
        let right = left + 1u;
        let t_left = intersect_aabb(origin, inv_dir, nodes[left].aabb_min, nodes[left].aabb_max, hit.t);
        let t_right = intersect_aabb(origin, inv_dir, nodes[right].aabb_min, nodes[right].aabb_max, hit.t);

        // Push the far child first so the near one is popped next.
        var near = left;
        var far = right;
        var t_near = t_left;
        var t_far = t_right;
        if (t_right < t_left) {
            near = right;
            far = left;
            t_near = t_right;
            t_far = t_left;
        }
        if (t_far < hit.t && sp < STACK_SIZE) {
            stack[sp] = far;
            sp += 1u;
        }
        if (t_near < hit.t && sp < STACK_SIZE) {
            stack[sp] = near;
            sp += 1u;
        }
    }
    return hit;
}

fn shade(hit: Hit, dir: vec3<f32>) -> vec4<f32> {
    if (hit.t >= NO_HIT) {
        return vec4<f32>(0.0);
    }
    let tri = triangles[hit.prim];
    var n = normalize(cross(tri.v1.xyz - tri.v0.xyz, tri.v2.xyz - tri.v0.xyz));
    if (dot(n, dir) > 0.0) {
        n = -n;
    }
    if (frame.shading == SHADING_EYE_LIGHT) {
        return vec4<f32>(vec3<f32>(abs(dot(n, dir))), 1.0);
    }
    return vec4<f32>(n * 0.5 + 0.5, 1.0);
}

fn linear_to_srgb(c: vec3<f32>) -> vec3<f32> {
    let v = clamp(c, vec3<f32>(0.0), vec3<f32>(1.0));
    let low = v * 12.92;
    let high = 1.055 * pow(v, vec3<f32>(1.0 / 2.4)) - 0.055;
    return select(high, low, v <= vec3<f32>(0.0031308));
}

@compute @workgroup_size(8, 8)
fn cs_main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (gid.x >= frame.width || gid.y >= frame.height) {
        return;
    }

    let jitter = sample_jitter(gid.x, gid.y, frame.sample);
    let sx = (f32(gid.x) + jitter.x) / f32(frame.width);
    let sy = (f32(gid.y) + jitter.y) / f32(frame.height);
    let dir = normalize(camera.dir_00.xyz + sx * camera.du.xyz + sy * camera.dv.xyz);

    let color = shade(trace(camera.position.xyz, dir), dir);

    let index = gid.y * frame.width + gid.x;
    var sum = color;
    if (frame.sample > 0u) {
        sum = accum[index] + color;
    }
    accum[index] = sum;
    let average = sum / f32(frame.sample + 1u);
    pixels[index] = pack4x8unorm(vec4<f32>(linear_to_srgb(average.rgb), average.a));
}
"#;

/// WGSL blit: a 4-vertex strip covering the target and a fragment stage
/// that copies the frame texel under each pixel. Pixels outside the frame
/// are black.
pub const BLIT_SHADER: &str = r#"
@group(0) @binding(0) var frame_tex: texture_2d<f32>;

@vertex
fn vs_blit(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let corner = vec2<f32>(f32(index & 1u), f32(index >> 1u));
    return vec4<f32>(corner * 2.0 - 1.0, 0.0, 1.0);
}

@fragment
fn fs_blit(@builtin(position) frag_coord: vec4<f32>) -> @location(0) vec4<f32> {
    let size = textureDimensions(frame_tex);
    let p = vec2<u32>(frag_coord.xy);
    if (p.x >= size.x || p.y >= size.y) {
        return vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }
    let texel = textureLoad(frame_tex, p, 0);
    return vec4<f32>(texel.rgb, 1.0);
}
"#;
