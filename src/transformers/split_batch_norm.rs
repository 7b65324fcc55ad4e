use smallvec::SmallVec;
use tracing::debug;

use crate::error::{FusionError, FusionResult};
use crate::fusion::FusionContext;
use crate::graph::{ComputeGraph, InAnchor, OpDesc, OutAnchor};
use crate::pattern::{FusionPattern, Mapping};
use crate::traits::{FusionOutcome, FusionPass};

/// Op type of the statistics half
pub const BN_TRAINING_REDUCE: &str = "BNTrainingReduce";
/// Op type of the normalization half
pub const BN_TRAINING_UPDATE: &str = "BNTrainingUpdate";

/// Splits BatchNorm into a reduce and an update node
///
/// Transforms:
///   BatchNorm(x, scale, offset, mean, var)
/// Into:
///   BNTrainingReduce(x) -> (sum, square_sum)
///   BNTrainingUpdate(x, sum, square_sum, scale, offset, mean, var)
///
/// The update node takes over every output of the original node.
#[derive(Debug, Default)]
pub struct BatchNormSplitPass;

impl BatchNormSplitPass {
    /// Create a new BatchNormSplitPass
    pub fn new() -> Self {
        Self
    }
}

impl FusionPass for BatchNormSplitPass {
    fn name(&self) -> &str {
        "BatchNormSplitPass"
    }

    fn define_patterns(&self) -> Vec<FusionPattern> {
        vec![FusionPattern::new("BatchNormSplit").add_descriptor("bn", &["BatchNorm"], 1, 1)]
    }

    fn fusion(
        &mut self,
        graph: &mut ComputeGraph,
        mapping: &Mapping,
        ctx: &FusionContext<'_>,
    ) -> FusionResult<FusionOutcome> {
        let bn = ctx
            .node_from_mapping("bn", mapping)
            .ok_or_else(|| FusionError::FusionFailed {
                pass: ctx.pass_name().to_string(),
                pattern: ctx.pattern().name().to_string(),
                reason: "descriptor [bn] is not bound".to_string(),
            })?;
        let bn_node = graph
            .node(bn)
            .ok_or_else(|| FusionError::NodeNotFound(bn.to_string()))?;

        let Some(x) = bn_node.inputs().first().and_then(|slot| slot.peer) else {
            debug!(node = %bn_node.name, "batch norm has no data input");
            return Ok(FusionOutcome::NotChanged);
        };

        let reduce_name = format!("{}_reduce", bn_node.name);
        let update_name = format!("{}_update", bn_node.name);
        if graph.find_node(&reduce_name).is_some() || graph.find_node(&update_name).is_some() {
            return Ok(FusionOutcome::NotChanged);
        }

        // inputs past x (scale, offset, mean, var), keeping their positions
        let params: SmallVec<[(usize, OutAnchor); 4]> = bn_node
            .inputs()
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, slot)| slot.peer.map(|p| (i, p)))
            .collect();
        let consumers: Vec<(usize, InAnchor)> = bn_node
            .outputs()
            .iter()
            .enumerate()
            .flat_map(|(i, slot)| slot.peers.iter().map(move |&c| (i, c)))
            .collect();

        // every endpoint must outlive the removal of bn
        let self_loop = x.node == bn
            || params.iter().any(|(_, p)| p.node == bn)
            || consumers.iter().any(|(_, c)| c.node == bn);
        if self_loop {
            debug!(node = %bn_node.name, "batch norm feeds itself");
            return Ok(FusionOutcome::NotChanged);
        }

        let mut reduce = OpDesc::new(reduce_name, BN_TRAINING_REDUCE).with_anchors(1, 2);
        reduce.attrs = bn_node.attrs.clone();
        let mut update = OpDesc::new(update_name, BN_TRAINING_UPDATE)
            .with_anchors(bn_node.inputs().len().max(1) + 2, bn_node.outputs().len().max(1));
        update.attrs = bn_node.attrs.clone();

        if ctx.has_checker() && !(ctx.check_op_supported(&reduce) && ctx.check_op_supported(&update)) {
            debug!(node = %bn_node.name, "split batch norm not supported");
            return Ok(FusionOutcome::NotChanged);
        }

        graph.remove_node(bn)?;
        let reduce = graph.add_node(reduce)?;
        let update = graph.add_node(update)?;

        graph.add_edge(x, InAnchor::new(reduce, 0))?;
        graph.add_edge(x, InAnchor::new(update, 0))?;
        graph.link(reduce, 0, update, 1)?;
        graph.link(reduce, 1, update, 2)?;
        for (i, producer) in params {
            graph.add_edge(producer, InAnchor::new(update, i + 2))?;
        }
        for (i, consumer) in consumers {
            graph.add_edge(OutAnchor::new(update, i), consumer)?;
        }

        debug!(%reduce, %update, "batch norm split");
        Ok(FusionOutcome::Fused(vec![reduce, update]))
    }
}
