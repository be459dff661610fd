//! SDFormat frame graph resolution.
//!
//! This crate loads [SDFormat](http://sdformat.org) worlds and models into an
//! immutable frame graph that answers "where is frame A relative to frame B"
//! for any joint configuration.
//!
//! # Features
//!
//! - Parse SDF XML from files or strings
//! - Normalize documents written in versions 1.0 through 1.11
//! - Expand `<include>` directives through a pluggable [`ModelFetch`]
//! - Build scoped names (`outer::inner::link`) for every frame
//! - Resolve `attached_to` and `relative_to` references with
//!   version-dependent defaults
//! - Detect attachment and pose reference cycles
//! - Compose batched relative transforms with numpy-style broadcasting
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. The resulting
//! [`FrameGraph`] is `Send + Sync` and can be queried from any thread.
//!
//! # Example
//!
//! ```
//! use sim_sdf::{JointValues, NoFetch, ResolverConfig, load_sdf_str};
//!
//! let sdf = r#"
//!     <sdf version="1.9">
//!         <model name="robot">
//!             <link name="base"/>
//!             <link name="arm"><pose>0 0 0.5 0 0 0</pose></link>
//!             <joint name="shoulder" type="revolute">
//!                 <parent>base</parent>
//!                 <child>arm</child>
//!                 <axis><xyz>0 1 0</xyz></axis>
//!             </joint>
//!         </model>
//!     </sdf>
//! "#;
//!
//! let graph = load_sdf_str(sdf, &NoFetch, &ResolverConfig::default()).expect("should load");
//! assert!(graph.contains("robot::shoulder"));
//!
//! let rest = graph.static_transform("robot::arm", "world").expect("connected");
//! assert!((rest.translation.z - 0.5).abs() < 1e-12);
//!
//! let values = JointValues::batched([3]).with_batch("robot::shoulder", vec![0.0, 0.5, 1.0]);
//! let poses = graph
//!     .get_transform("robot::arm", "robot::base", &values)
//!     .expect("should compose");
//! assert_eq!(poses.shape(), &[3]);
//! ```
//!
//! # Frames
//!
//! - `world` - the root, always named `world`
//! - `<model>` and `<actor>` - a frame and a naming scope
//! - `<link>` and `<frame>` - plain frames
//! - `<joint>` - two frames: the joint itself on the child side, and
//!   `<name>_parent` on the parent side
//!
//! # Limitations
//!
//! - Lights and sensors are parsed but do not become frames
//! - Merge includes (`<include merge="true">`) are not supported
//! - Kinematic loops are rejected

#![doc(html_root_url = "https://docs.rs/sim-sdf/0.7.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::redundant_closure_for_method_calls,
    clippy::items_after_statements,
    clippy::needless_pass_by_value,
    clippy::map_unwrap_or,
    clippy::option_if_let_else,
    clippy::unused_self
)]

mod attachment;
mod compose;
mod config;
mod error;
mod fetch;
mod frame_table;
mod graph;
mod include;
mod loader;
mod normalize;
mod orientation;
mod parser;
mod pose;
mod types;
mod version;

// Re-export main types
pub use compose::{BatchTransform, JointValues, broadcast_shapes, joint_motion, ravel, unravel};
pub use config::ResolverConfig;
pub use error::{Result, SdfError};
pub use fetch::{DirectoryFetcher, Fragment, MODEL_FILE, MemoryFetcher, ModelFetch, NoFetch};
pub use frame_table::FrameId;
pub use graph::{FrameDescriptor, FrameGraph};
pub use include::resolve_includes;
pub use loader::{SdfLoader, load_document, load_sdf_file, load_sdf_str};
pub use normalize::{normalize_document, normalize_element, normalize_pose, top_level_entities};
pub use orientation::RotationFormat;
pub use parser::{RawDocument, RawElement, parse_sdf_str};
pub use pose::{EdgeTransform, JointMotion, PoseEdge};
pub use types::{
    CanonicalElement, ElementKind, FrameKind, FrameRef, IncludeAttrs, JointAttrs, JointAxis,
    JointType, LightKind, MODEL_FRAME, ModelAttrs, SensorKind, WORLD_FRAME,
};
pub use version::{
    AttachDefault, DEFAULT_RULES, DefaultRule, FormatVersion, PoseDefault, VersionFamily,
    default_rule,
};
