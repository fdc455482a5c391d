//! Base kubelet template
//!
//! The skeleton `KubeletConfiguration` every pool starts from. The template
//! is embedded at build time, rendered once for the cluster's platform at
//! startup and then shared read-only.

use crate::error::RenderError;
use crate::features::FeatureMap;
use minijinja::{context, Environment, UndefinedBehavior};
use std::net::IpAddr;

const KUBELET_TEMPLATE: &str = include_str!("../templates/kubelet.yaml");

/// Infrastructure platform the cluster runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    /// Amazon Web Services
    Aws,
    /// Microsoft Azure
    Azure,
    /// Google Cloud Platform
    Gcp,
    /// OpenStack
    OpenStack,
    /// VMware vSphere
    VSphere,
    /// Bare metal hosts without a cloud provider
    BareMetal,
    /// No platform integration
    None,
    /// Anything else; rendered like `None`
    Unrecognized(String),
}

impl Platform {
    /// Case-insensitive parse of a platform name
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "aws" => Self::Aws,
            "azure" => Self::Azure,
            "gcp" => Self::Gcp,
            "openstack" => Self::OpenStack,
            "vsphere" => Self::VSphere,
            "baremetal" => Self::BareMetal,
            "none" | "" => Self::None,
            _ => Self::Unrecognized(value.to_string()),
        }
    }

    /// Public cloud platforms
    pub fn is_cloud(&self) -> bool {
        matches!(self, Self::Aws | Self::Azure | Self::Gcp)
    }
}

/// Values substituted into the template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    /// Platform deciding `serializeImagePulls`
    pub platform: Platform,
    /// Address written to `clusterDNS`; must parse as an IP
    pub cluster_dns_ip: String,
}

impl TemplateContext {
    /// Creates a context for `platform` with the given cluster DNS address
    pub fn new(platform: Platform, cluster_dns_ip: impl Into<String>) -> Self {
        Self {
            platform,
            cluster_dns_ip: cluster_dns_ip.into(),
        }
    }
}

/// The rendered base template, as a JSON document
#[derive(Debug, Clone, PartialEq)]
pub struct BaseTemplate {
    document: serde_json::Value,
}

impl BaseTemplate {
    /// Renders the embedded template.
    ///
    /// Any failure here is a startup error: nothing can be rendered without a
    /// base template.
    pub fn load(ctx: &TemplateContext) -> Result<Self, RenderError> {
        Self::from_source(KUBELET_TEMPLATE, ctx)
    }

    /// Renders a template from source text.
    ///
    /// Undefined variables are errors, so a template referencing anything
    /// other than `cluster_dns_ip` and `serialize_image_pulls` fails to load.
    pub fn from_source(source: &str, ctx: &TemplateContext) -> Result<Self, RenderError> {
        ctx.cluster_dns_ip.parse::<IpAddr>()
            .map_err(|e| RenderError::Template(format!("invalid cluster DNS IP {:?}: {}", ctx.cluster_dns_ip, e)))?;

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template("kubelet", source)
            .map_err(|e| RenderError::Template(format!("invalid kubelet template: {}", e)))?;

        // parallel image pulls on cloud platforms
        let rendered = env.get_template("kubelet")
            .and_then(|template| {
                template.render(context! {
                    cluster_dns_ip => ctx.cluster_dns_ip,
                    serialize_image_pulls => !ctx.platform.is_cloud(),
                })
            })
            .map_err(|e| RenderError::Template(format!("failed to render kubelet template: {}", e)))?;

        let document: serde_json::Value = serde_yaml::from_str(&rendered)
            .map_err(|e| RenderError::Template(format!("failed to parse kubelet template: {}", e)))?;
        if !document.is_object() {
            return Err(RenderError::Template("kubelet template is not a mapping".to_string()));
        }

        Ok(Self { document })
    }

    /// The rendered `KubeletConfiguration` document
    pub fn document(&self) -> &serde_json::Value {
        &self.document
    }

    /// The `featureGates` block embedded in the template
    pub fn feature_gates(&self) -> Result<FeatureMap, RenderError> {
        let gates = self.document.get("featureGates")
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        Ok(serde_json::from_value(gates)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse() {
        assert_eq!(Platform::parse("AWS"), Platform::Aws);
        assert_eq!(Platform::parse("None"), Platform::None);
        assert_eq!(Platform::parse(""), Platform::None);
        assert_eq!(Platform::parse("Nutanix"), Platform::Unrecognized("Nutanix".to_string()));
    }

    #[test]
    fn test_load_substitutes_context() {
        let template = BaseTemplate::load(&TemplateContext::new(Platform::Aws, "10.0.0.10")).unwrap();
        let doc = template.document();

        assert_eq!(doc["clusterDNS"], serde_json::json!(["10.0.0.10"]));
        assert_eq!(doc["serializeImagePulls"], serde_json::json!(false));
        assert_eq!(doc["kind"], "KubeletConfiguration");

        let bare = BaseTemplate::load(&TemplateContext::new(Platform::BareMetal, "10.0.0.10")).unwrap();
        assert_eq!(bare.document()["serializeImagePulls"], serde_json::json!(true));
    }

    #[test]
    fn test_invalid_dns_ip_is_rejected() {
        let err = BaseTemplate::load(&TemplateContext::new(Platform::None, "not-an-ip")).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
    }

    #[test]
    fn test_undefined_variable_is_rejected() {
        let ctx = TemplateContext::new(Platform::None, "10.0.0.10");
        let err = BaseTemplate::from_source("maxPods: {{ max_pods }}\n", &ctx).unwrap_err();
        assert!(matches!(err, RenderError::Template(_)));
        assert!(err.to_string().contains("failed to render"));
    }

    #[test]
    fn test_malformed_template_is_rejected() {
        let ctx = TemplateContext::new(Platform::None, "10.0.0.10");
        let err = BaseTemplate::from_source("clusterDNS: {{ cluster_dns_ip\n", &ctx).unwrap_err();
        assert!(err.to_string().contains("invalid kubelet template"));
    }

    #[test]
    fn test_custom_source_renders_both_variables() {
        let ctx = TemplateContext::new(Platform::Gcp, "fd00::a");
        let template = BaseTemplate::from_source(
            "clusterDNS: [\"{{ cluster_dns_ip }}\"]\nserializeImagePulls: {{ serialize_image_pulls }}\n",
            &ctx,
        )
        .unwrap();
        assert_eq!(template.document()["clusterDNS"], serde_json::json!(["fd00::a"]));
        assert_eq!(template.document()["serializeImagePulls"], serde_json::json!(false));
    }

    #[test]
    fn test_non_mapping_template_is_rejected() {
        let ctx = TemplateContext::new(Platform::None, "10.0.0.10");
        assert!(BaseTemplate::from_source("- a\n- b\n", &ctx).is_err());
    }
}
