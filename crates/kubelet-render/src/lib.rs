//! Kubelet Config Rendering
//!
//! Pure, synchronous building blocks of the kubelet config controller:
//!
//! - [`features`]: resolves the effective feature-gate map from the cluster
//!   `FeatureGate` policy
//! - [`selector`]: picks the `KubeletConfig` overrides that target a pool, in
//!   a stable order
//! - [`render`]: merges the base template, feature gates and overrides into a
//!   kubelet configuration document
//! - [`keys`]: canonical and legacy MachineConfig names for a pool
//! - [`artifact`] and [`encoder`]: wrap the document into the Ignition payload
//!   stored in a MachineConfig
//!
//! Nothing here performs I/O. The base template and feature sets are built
//! once at startup and shared read-only.
//!
//! # Example
//!
//! ```
//! use kubelet_render::{
//!     build_artifact, features, keys_for, render, select, selector_matches, BaseTemplate,
//!     FeaturePolicy, FeatureSets, Platform, Pool, TemplateContext,
//! };
//!
//! # fn example() -> Result<(), kubelet_render::RenderError> {
//! let template = BaseTemplate::load(&TemplateContext::new(Platform::None, "172.30.0.10"))?;
//! let sets = FeatureSets::builtin();
//! let pool = Pool::new("worker").with_label("pools.dcops.microscaler.io/worker", "");
//!
//! let resolved = features::resolve(&FeaturePolicy::default(), &sets)?;
//! let overrides = select(&pool, &[], selector_matches);
//! let config = render(&pool, &resolved.gates, &overrides, &template)?;
//! let artifact = build_artifact(&pool, &config)?;
//!
//! assert_eq!(artifact.keys, keys_for(&pool));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod artifact;
pub mod encoder;
pub mod error;
pub mod features;
pub mod keys;
pub mod labels;
pub mod model;
pub mod render;
pub mod selector;
pub mod template;

pub use artifact::{build_artifact, RenderedArtifact};
pub use error::RenderError;
pub use features::{FeatureMap, FeatureSets, ResolvedFeatures};
pub use keys::{keys_for, ArtifactKeys};
pub use labels::{selector_matches, LabelMatcher};
pub use model::{FeaturePolicy, FeatureSet, Override, Pool};
pub use render::{render, RenderedConfig};
pub use selector::select;
pub use template::{BaseTemplate, Platform, TemplateContext};
