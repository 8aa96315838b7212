pub mod color;
pub mod error;
pub mod expression;
pub mod geometry;
pub mod line;
pub mod line_map;
pub mod parameter;
pub mod playback;
pub mod sampler;
pub mod scene;
pub mod settings;
pub mod trace;
/// The `hyplot_core` crate turns a simulated hybrid-system trace into 3D plot
/// geometry, incrementally and without blocking the caller.
///
/// Key components:
/// - **Trace**: typed phase tree (`PhaseTree` arena) loaded from simulator JSON.
/// - **Parameter**: Cartesian grid of parameter conditions and the tolerance-based
///   containment test deciding which phases apply.
/// - **Sampler**: evaluates the user's `(x, y, z)` axis formulas along a phase.
/// - **Traversal**: resumable depth-first walk that yields to the host every
///   time its wall-clock budget runs out.
/// - **Geometry / Playback**: solid and dashed segment batches, range ribbons,
///   and the animation cursor shared by every marker.
/// - **Line / LineMap**: per-line plot sessions over the host `traits`.
pub mod traits;
pub mod traversal;
