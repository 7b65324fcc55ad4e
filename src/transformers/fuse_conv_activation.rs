use tracing::debug;

use crate::error::{FusionError, FusionResult};
use crate::fusion::FusionContext;
use crate::graph::{AttrHolder, AttrValue, ComputeGraph};
use crate::pattern::{BranchKind, FusionPattern, Mapping};
use crate::traits::{FusionOutcome, FusionPass};
use crate::transform::{can_fuse, fuse_nodes};

/// Activations that can be folded into a convolution
pub const ACTIVATIONS: &[&str] = &["Relu", "Relu6", "LeakyRelu", "Sigmoid"];

/// Attribute naming the folded activation
pub const ATTR_ACTIVATION: &str = "activation";

/// Fuses Conv + activation into Conv
///
/// Transforms:
///   Conv(x) -> Relu
/// Into:
///   Conv(x, activation="Relu")
#[derive(Debug, Default)]
pub struct ConvActivationFusionPass;

impl ConvActivationFusionPass {
    /// Create a new ConvActivationFusionPass
    pub fn new() -> Self {
        Self
    }
}

impl FusionPass for ConvActivationFusionPass {
    fn name(&self) -> &str {
        "ConvActivationFusionPass"
    }

    fn define_patterns(&self) -> Vec<FusionPattern> {
        vec![FusionPattern::new("ConvActivation")
            .add_descriptor("conv", &["Conv"], 1, 1)
            .add_descriptor("act", ACTIVATIONS, 1, 1)
            .set_outputs("conv", &["act"], BranchKind::Serial)
            .set_head(&["conv"])]
    }

    fn fusion(
        &mut self,
        graph: &mut ComputeGraph,
        mapping: &Mapping,
        ctx: &FusionContext<'_>,
    ) -> FusionResult<FusionOutcome> {
        let missing = |id: &str| FusionError::FusionFailed {
            pass: ctx.pass_name().to_string(),
            pattern: ctx.pattern().name().to_string(),
            reason: format!("descriptor [{}] is not bound", id),
        };
        let conv = ctx.node_from_mapping("conv", mapping).ok_or_else(|| missing("conv"))?;
        let act = ctx.node_from_mapping("act", mapping).ok_or_else(|| missing("act"))?;

        // the conv output must not be observed by anyone else
        if !can_fuse(graph, conv, act) {
            debug!(%conv, "conv output has other consumers");
            return Ok(FusionOutcome::NotChanged);
        }

        let conv_node = graph
            .node(conv)
            .ok_or_else(|| FusionError::NodeNotFound(conv.to_string()))?;
        if conv_node.has_attr(ATTR_ACTIVATION) {
            return Ok(FusionOutcome::NotChanged);
        }
        let act_type = graph
            .op_type(act)
            .ok_or_else(|| FusionError::NodeNotFound(act.to_string()))?
            .to_string();

        let mut desc = conv_node.to_desc();
        desc.set_str(ATTR_ACTIVATION, act_type.as_str());
        if let Some(node) = graph.node(act) {
            // carry activation parameters such as LeakyRelu's alpha
            for (key, value) in &node.attrs {
                if !key.starts_with('_') && !desc.has_attr(key) {
                    desc.attrs.insert(key.clone(), value.clone());
                }
            }
        }

        if ctx.has_checker() && !ctx.check_op_supported(&desc) {
            debug!(node = %desc.name, activation = %act_type, "fused conv not supported");
            return Ok(FusionOutcome::NotChanged);
        }

        let fused = fuse_nodes(graph, &[conv, act], desc)?;
        debug!(%fused, activation = %act_type, "conv activation fused");
        Ok(FusionOutcome::Fused(vec![fused]))
    }
}

/// Whether a node carries a folded activation of the given type
pub fn has_activation(attrs: &impl AttrHolder, act_type: &str) -> bool {
    matches!(attrs.attrs().get(ATTR_ACTIVATION), Some(AttrValue::Str(s)) if s == act_type)
}
