// gantry: Build task planning and ordering engine.
// Copyright (C) 2024 International Digital Economy Academy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// For inquiries, you can contact us via e-mail at jichuruanjian@idea.edu.cn.

//! Property tests of the serial predecessor over random hosting layouts.

use gantry_plan::{
    global_plan::{GlobalProductPlan, PlanRequest, TargetGraph},
    model::TargetId,
    order::previous_target_for_serial_build,
};
use proptest::prelude::*;

/// Builds `count` targets in order, hosting target `i` by `hosts[i]` when
/// valid. Hosts are never hosted themselves and never host themselves.
fn build(count: usize, hosts: &[Option<usize>]) -> (GlobalProductPlan, Vec<TargetId>) {
    let mut b = TargetGraph::builder();
    let ids: Vec<TargetId> = (0..count).map(|i| b.target(&format!("T{i}"))).collect();
    let mut host_of: Vec<Option<usize>> = vec![None; count];
    let mut is_host = vec![false; count];
    for (i, host) in hosts.iter().take(count).enumerate() {
        let Some(h) = *host else { continue };
        if h >= count || h == i || host_of[h].is_some() || is_host[i] {
            continue;
        }
        host_of[i] = Some(h);
        is_host[h] = true;
        b.host(ids[i], ids[h]);
    }
    let request = PlanRequest {
        targets_build_in_parallel: false,
        ..Default::default()
    };
    (GlobalProductPlan::new(b.finish(), request), ids)
}

proptest! {
    #[test]
    fn serial_predecessor_is_an_earlier_target(
        count in 1usize..10,
        hosts in prop::collection::vec(prop::option::of(0usize..10), 10),
    ) {
        let (plan, ids) = build(count, &hosts);
        for &t in &ids {
            let Some(prev) = previous_target_for_serial_build(&plan, t) else {
                continue;
            };
            prop_assert_ne!(prev, t);
            prop_assert!(plan.position(prev) < plan.position(t));
            if plan.host_target(t).is_none() {
                prop_assert!(plan.host_target(prev).is_none());
            } else {
                prop_assert_eq!(plan.host_target(prev), plan.host_target(t));
            }
        }
    }

    #[test]
    fn serial_plans_are_acyclic(
        count in 1usize..6,
        hosts in prop::collection::vec(prop::option::of(0usize..6), 6),
    ) {
        let (plan, _) = build(count, &hosts);
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let outcome = rt.block_on(
            gantry_plan::planner::Planner::default()
                .plan(&plan, &tokio_util::sync::CancellationToken::new()),
        );
        prop_assert!(outcome.is_ok(), "{:?}", outcome.err());
    }
}
