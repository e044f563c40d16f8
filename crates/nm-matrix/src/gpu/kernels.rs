//! WGSL sources for the GPU kernels.
//!
//! Every kernel uses the same six bindings and the same partitioning: a
//! workgroup of [`LANES`] invocations covers [`GROUP_SIZE`] consecutive output
//! elements, each invocation striding by `LANES`.

use crate::accel::GROUP_SIZE;
use crate::op::BinaryOp;

/// Invocations per workgroup. Kept at the downlevel limit of 256.
pub const LANES: usize = 256;

const BINDINGS: &str = r#"
@group(0) @binding(0) var<storage, read> lhs: array<f32>;
@group(0) @binding(1) var<storage, read> rhs: array<f32>;
@group(0) @binding(2) var<storage, read_write> dst: array<f32>;
@group(0) @binding(3) var<storage, read> lhs_shape: vec2<u32>;
@group(0) @binding(4) var<storage, read> rhs_shape: vec2<u32>;
@group(0) @binding(5) var<storage, read> dst_shape: vec2<u32>;
"#;

const ELEMENTWISE: &str = r#"
@compute @workgroup_size(LANES)
fn main(
    @builtin(workgroup_id) group: vec3<u32>,
    @builtin(local_invocation_id) local: vec3<u32>,
) {
    let len = dst_shape.x * dst_shape.y;
    for (var step = 0u; step < GROUP_SIZE / LANES; step = step + 1u) {
        let index = group.x * GROUP_SIZE + step * LANES + local.x;
        if (index < len) {
            dst[index] = lhs[index] OPERATOR rhs[index];
        }
    }
}
"#;

const MATMUL: &str = r#"
@compute @workgroup_size(LANES)
fn main(
    @builtin(workgroup_id) group: vec3<u32>,
    @builtin(local_invocation_id) local: vec3<u32>,
) {
    let len = dst_shape.x * dst_shape.y;
    let inner = lhs_shape.y;
    for (var step = 0u; step < GROUP_SIZE / LANES; step = step + 1u) {
        let index = group.x * GROUP_SIZE + step * LANES + local.x;
        if (index < len) {
            let row = index / dst_shape.y;
            let col = index % dst_shape.y;
            var sum = 0.0;
            for (var k = 0u; k < inner; k = k + 1u) {
                sum = sum + lhs[row * inner + k] * rhs[k * rhs_shape.y + col];
            }
            dst[index] = sum;
        }
    }
}
"#;

/// The complete WGSL module for `op`.
pub fn source(op: BinaryOp) -> String {
    let body = match op {
        BinaryOp::Add => ELEMENTWISE.replace("OPERATOR", "+"),
        BinaryOp::Subtract => ELEMENTWISE.replace("OPERATOR", "-"),
        BinaryOp::Multiply => MATMUL.to_string(),
    };
    format!(
        "const GROUP_SIZE: u32 = {}u;\nconst LANES: u32 = {}u;\n{}{}",
        GROUP_SIZE, LANES, BINDINGS, body
    )
}
