use serde::{Deserialize, Serialize};

use crate::core::evidence::ToolName;

/// One step of an investigation plan. `stepKey` is the stable identifier the
/// UI and step-level events key on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStep {
    pub step_key: String,
    pub tool: ToolName,
    pub title: String,
    pub reason: String,
}

impl PlannedStep {
    fn new(step_key: &str, tool: ToolName, title: &str, reason: &str) -> Self {
        Self {
            step_key: step_key.to_string(),
            tool,
            title: title.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// The unconditional core plus the steps each configured provider unlocks.
/// Ordering respects prerequisite chains: pairs before the LP probe, source
/// info before owner/capability analysis, metadata before holders.
pub fn baseline_plan(explorer_enabled: bool, holders_enabled: bool) -> Vec<PlannedStep> {
    let mut plan = vec![
        PlannedStep::new(
            "rpc_bytecode",
            ToolName::RpcGetBytecode,
            "Fetch contract bytecode",
            "Confirm the address is a deployed contract",
        ),
        PlannedStep::new(
            "rpc_metadata",
            ToolName::RpcGetErc20Metadata,
            "Read ERC-20 metadata",
            "Establish name, symbol, decimals and total supply",
        ),
        PlannedStep::new(
            "dex_pairs",
            ToolName::DexscreenerGetPairs,
            "Find DEX trading pairs",
            "Locate pools, liquidity depth and trading activity",
        ),
        PlannedStep::new(
            "honeypot_sim",
            ToolName::HoneypotGetSimulation,
            "Simulate buy and sell",
            "Check sellability and effective taxes",
        ),
        PlannedStep::new(
            "lp_lock",
            ToolName::LpV2LockStatus,
            "Infer LP lock status",
            "Determine whether pool liquidity can be withdrawn",
        ),
    ];

    if explorer_enabled {
        plan.push(PlannedStep::new(
            "source_info",
            ToolName::BasescanGetSourceInfo,
            "Fetch verified source & ABI",
            "Verified source unlocks capability and owner analysis",
        ));
        plan.push(PlannedStep::new(
            "contract_creation",
            ToolName::BasescanGetContractCreation,
            "Look up contract creation",
            "Identify the deployer for LP and ownership checks",
        ));
        plan.push(PlannedStep::new(
            "owner_status",
            ToolName::ContractOwnerStatus,
            "Check contract ownership",
            "Renounced ownership limits privileged actions",
        ));
        plan.push(PlannedStep::new(
            "capability_scan",
            ToolName::ContractCapabilityScan,
            "Scan ABI capabilities",
            "Flag mint, blacklist, pause, fee and trading switches",
        ));
    }

    if holders_enabled {
        plan.push(PlannedStep::new(
            "top_holders",
            ToolName::HoldersGetTopHolders,
            "Fetch top holders",
            "Measure supply concentration among the largest wallets",
        ));
    }

    plan
}

/// Merge the baseline with planner-proposed steps. Baseline order is kept;
/// proposed tools not already present are appended in proposal order,
/// restricted to the tools available under the current configuration.
/// Deduplication is by tool name, whatever the proposed step key.
pub fn merge_plan(
    baseline: Vec<PlannedStep>,
    proposed: Vec<PlannedStep>,
    available: &[ToolName],
) -> Vec<PlannedStep> {
    let mut merged = baseline;
    for step in proposed {
        if merged.iter().any(|s| s.tool == step.tool) {
            continue;
        }
        if !available.contains(&step.tool) {
            continue;
        }
        merged.push(step);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tools_of(plan: &[PlannedStep]) -> Vec<ToolName> {
        plan.iter().map(|s| s.tool).collect()
    }

    #[test]
    fn minimal_baseline_has_the_five_core_steps() {
        let plan = baseline_plan(false, false);
        assert_eq!(
            tools_of(&plan),
            vec![
                ToolName::RpcGetBytecode,
                ToolName::RpcGetErc20Metadata,
                ToolName::DexscreenerGetPairs,
                ToolName::HoneypotGetSimulation,
                ToolName::LpV2LockStatus,
            ]
        );
    }

    #[test]
    fn explorer_and_holders_steps_are_conditional() {
        let plan = baseline_plan(true, true);
        assert_eq!(plan.len(), 10);
        assert_eq!(plan[5].tool, ToolName::BasescanGetSourceInfo);
        assert_eq!(plan.last().unwrap().tool, ToolName::HoldersGetTopHolders);

        let plan = baseline_plan(true, false);
        assert_eq!(plan.len(), 9);
        assert!(!tools_of(&plan).contains(&ToolName::HoldersGetTopHolders));
    }

    #[test]
    fn merge_with_itself_is_idempotent() {
        let baseline = baseline_plan(true, true);
        let merged = merge_plan(baseline.clone(), baseline.clone(), &ToolName::ALL);
        assert_eq!(merged, baseline);
    }

    #[test]
    fn merge_appends_new_tools_in_proposal_order() {
        let baseline = baseline_plan(false, false);
        let proposed = vec![
            PlannedStep::new("h", ToolName::HoldersGetTopHolders, "Holders", "why"),
            PlannedStep::new("s", ToolName::BasescanGetSourceInfo, "Source", "why"),
        ];
        let merged = merge_plan(baseline, proposed, &ToolName::ALL);
        let tools = tools_of(&merged);
        assert_eq!(tools[5], ToolName::HoldersGetTopHolders);
        assert_eq!(tools[6], ToolName::BasescanGetSourceInfo);
    }

    #[test]
    fn merge_dedup_is_by_tool_name_not_step_key() {
        let baseline = baseline_plan(false, false);
        let proposed = vec![PlannedStep::new(
            "custom_bytecode_check",
            ToolName::RpcGetBytecode,
            "Again",
            "duplicate",
        )];
        let merged = merge_plan(baseline.clone(), proposed, &ToolName::ALL);
        assert_eq!(merged, baseline);
    }

    #[test]
    fn merge_filters_unavailable_tools() {
        let baseline = baseline_plan(false, false);
        let available = tools_of(&baseline);
        let proposed = vec![PlannedStep::new(
            "h",
            ToolName::HoldersGetTopHolders,
            "Holders",
            "no provider configured",
        )];
        let merged = merge_plan(baseline.clone(), proposed, &available);
        assert_eq!(merged, baseline);
    }

    #[test]
    fn empty_proposal_keeps_the_baseline() {
        let baseline = baseline_plan(false, false);
        let merged = merge_plan(baseline.clone(), vec![], &ToolName::ALL);
        assert_eq!(merged, baseline);
    }
}
