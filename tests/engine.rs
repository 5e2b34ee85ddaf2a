//! End-to-end tests of the analyses through the public API.

use std::{collections::VecDeque, sync::Arc};

use flowscope::prelude::*;

fn origins_of(graph: &InstructionGraph, num_locals: usize) -> Result<Vec<bool>> {
    let config = AnalysisConfig::default();
    let frames = FrameSimulator::compute_frames(graph, num_locals)?;
    OriginTracker::new(graph, &config).result_origins(&frames)
}

#[test]
fn growing_facts_exhaust_the_budget() {
    // 0: label top, 1: goto top
    let mut asm = CodeAssembler::new();
    asm.label("top").unwrap().goto("top").unwrap();
    let graph = asm.finish().unwrap();

    let config = AnalysisConfig::default();
    let solver = WorklistSolver::new(&graph, Direction::Forward, &config);
    let budget = solver.budget();
    let result = solver.run([(0, 0u64)], |_, &n| Ok(Flow::Continue(n + 1)));
    assert_eq!(
        result,
        Err(Error::TooComplex {
            steps: budget + 1,
            budget
        })
    );

    // Uncharged propagation is capped as well.
    let result = solver.run([(0, 0u64)], |_, &n| Ok(Flow::Pass(n + 1)));
    assert!(result.unwrap_err().is_too_complex());
}

#[test]
fn acyclic_graph_dequeues_each_pair_once() {
    // if (c) { r = new } else { r = 1 } return r
    let mut asm = CodeAssembler::new();
    asm.push_const()
        .unwrap()
        .if_true("else")
        .unwrap()
        .new_object()
        .unwrap()
        .goto("join")
        .unwrap()
        .label("else")
        .unwrap()
        .push_const()
        .unwrap()
        .label("join")
        .unwrap()
        .ret_value()
        .unwrap();
    let graph = asm.finish().unwrap();

    let config = AnalysisConfig::default();
    let solver = WorklistSolver::new(&graph, Direction::Forward, &config);
    let stats = solver.run([(0, ())], |_, _| Ok(Flow::Continue(()))).unwrap();
    assert_eq!(stats.dequeued, stats.distinct_pairs);
    assert_eq!(stats.dequeued, graph.len());

    assert_eq!(
        origins_of(&graph, 0).unwrap(),
        vec![false, false, true, false, false, true, false, false]
    );
}

/// 0: push, 1: store x, 2: stmt, 3: nop | load x, 4: nop | pop,
/// 5: push, 6: store y, 7: stmt, 8: load y, 9: return
fn kill_variant(extra_read: bool) -> (InstructionGraph, VarId) {
    let mut asm = CodeAssembler::new();
    let x = asm.local(0);
    let y = asm.local(1);
    asm.push_const().unwrap().store(x).unwrap().statement().unwrap();
    if extra_read {
        asm.load(x).unwrap().pop().unwrap();
    } else {
        asm.nop().unwrap().nop().unwrap();
    }
    asm.push_const()
        .unwrap()
        .store(y)
        .unwrap()
        .statement()
        .unwrap()
        .load(y)
        .unwrap()
        .ret_value()
        .unwrap();
    (asm.finish().unwrap(), x)
}

#[test]
fn extra_read_only_grows_live_sets() {
    let config = AnalysisConfig::default();
    let (without, x) = kill_variant(false);
    let (with, _) = kill_variant(true);
    let live_without = LivenessAnalyzer::new(&without, &config)
        .live_variables()
        .unwrap();
    let live_with = LivenessAnalyzer::new(&with, &config)
        .live_variables()
        .unwrap();

    assert_eq!(live_without.len(), live_with.len());
    for (boundary, smaller) in live_without.iter() {
        let larger = live_with.live_at(boundary).unwrap();
        assert!(smaller.iter().all(|var| larger.contains(var)));
    }

    assert!(!live_without.live_at(2).unwrap().contains(x));
    assert!(live_with.live_at(2).unwrap().contains(x));
}

#[test]
fn flushed_variables_are_never_read_again() {
    // 0: push, 1: store x, 2: stmt, 3: push, 4: store y, 5: stmt, 6: load x, 7: if skip,
    // 8: load y, 9: store z, 10: stmt, 11: label skip, 12: stmt, 13: load y, 14: return
    let mut asm = CodeAssembler::new();
    let x = asm.local(0);
    let y = asm.local(1);
    let z = asm.local(2);
    asm.push_const()
        .unwrap()
        .store(x)
        .unwrap()
        .statement()
        .unwrap()
        .push_const()
        .unwrap()
        .store(y)
        .unwrap()
        .statement()
        .unwrap()
        .load(x)
        .unwrap()
        .if_true("skip")
        .unwrap()
        .load(y)
        .unwrap()
        .store(z)
        .unwrap()
        .statement()
        .unwrap()
        .label("skip")
        .unwrap()
        .statement()
        .unwrap()
        .load(y)
        .unwrap()
        .ret_value()
        .unwrap();
    let graph = asm.finish().unwrap();

    let config = AnalysisConfig::default();
    let analyzer = LivenessAnalyzer::new(&graph, &config);
    let live = analyzer.live_variables().unwrap();
    let plan = analyzer.flush_plan_from(&live).unwrap();

    assert!(plan.at(2).is_empty());
    assert!(plan.at(5).is_empty());
    assert_eq!(plan.at(10), &[x]);
    assert_eq!(plan.at(12), &[x]);

    for (boundary, flushed) in plan.iter() {
        for &var in flushed {
            let mut seen = vec![false; graph.len()];
            let mut queue: VecDeque<usize> = graph.successors(boundary).iter().copied().collect();
            while let Some(index) = queue.pop_front() {
                if std::mem::replace(&mut seen[index], true) {
                    continue;
                }
                if graph.kind(index).written_variable() == Some(var) {
                    continue;
                }
                if let Some(set) = live.live_at(index) {
                    assert!(
                        !set.contains(var),
                        "{var:?} flushed at {boundary} but live at {index}"
                    );
                }
                queue.extend(graph.successors(index));
            }
        }
    }
}

#[test]
fn too_complex_liveness_flushes_nothing() {
    let mut asm = CodeAssembler::new();
    let x = asm.local(0);
    asm.push_const()
        .unwrap()
        .store(x)
        .unwrap()
        .statement()
        .unwrap()
        .load(x)
        .unwrap()
        .ret_value()
        .unwrap();
    let graph = asm.finish().unwrap();

    let config = AnalysisConfig::default().with_step_multiplier(1);
    assert!(LivenessAnalyzer::new(&graph, &config)
        .flush_plan()
        .unwrap_err()
        .is_too_complex());
    assert!(flush_plan_or_empty(&graph, &config).unwrap().is_empty());
}

#[test]
fn canonical_member_is_stable_and_inside_the_class() {
    let mut store = VariableStore::new();
    let this = store.add_this(0);
    let a = store.add_field(this, "a").unwrap();
    let b = store.add_field(a, "b").unwrap();
    let x = store.add_local(1);
    let y = store.add_local(2);
    let mut classes = EquivalenceClasses::new(Arc::new(store));

    let left = classes.merge(b, a).unwrap();
    let right = classes.merge(y, x).unwrap();
    for class in [left, right] {
        assert_eq!(
            classes.canonical(class).unwrap(),
            classes.canonical(class).unwrap()
        );
    }

    let union = classes.merge(a, y).unwrap();
    let canonical = classes.canonical(union).unwrap();
    assert!(classes.members(union).unwrap().contains(&canonical));
    assert_eq!(canonical, x);
    assert_eq!(classes.canonical(union).unwrap(), canonical);
}

#[test]
fn pushed_constant_is_the_returned_value() {
    let mut asm = CodeAssembler::new();
    asm.push_const().unwrap().ret_value().unwrap();
    let graph = asm.finish().unwrap();
    assert_eq!(origins_of(&graph, 0).unwrap(), vec![true, false]);
}

#[test]
fn field_read_is_never_an_origin() {
    let mut asm = CodeAssembler::new();
    asm.get_static().unwrap().ret_value().unwrap();
    let graph = asm.finish().unwrap();
    assert_eq!(origins_of(&graph, 0).unwrap(), vec![false, false]);

    // The policy is the caller's: without FIELD_READ the read is its own origin.
    let config = AnalysisConfig::default()
        .with_opaque_producers(OpaqueProducers::VIRTUAL_CALL | OpaqueProducers::ARRAY_READ);
    let frames = FrameSimulator::compute_frames(&graph, 0).unwrap();
    let origins = OriginTracker::new(&graph, &config)
        .result_origins(&frames)
        .unwrap();
    assert_eq!(origins, vec![true, false]);
}

#[test]
fn subroutine_body_stays_out_of_the_caller() {
    // 0: jsr fin, 1: push, 2: return, 3: label fin, 4: store addr, 5: ret addr
    let mut asm = CodeAssembler::new();
    let addr = asm.local(0);
    asm.jsr("fin")
        .unwrap()
        .push_const()
        .unwrap()
        .ret_value()
        .unwrap()
        .label("fin")
        .unwrap()
        .store(addr)
        .unwrap()
        .ret(0)
        .unwrap();
    let graph = asm.finish().unwrap();

    let mut finder = RegionFinder::new(&graph);
    let scan = finder.find_region(0, RegionId::MAIN).unwrap();
    assert_eq!(scan.visited, vec![0, 1, 2]);
    assert_eq!(scan.boundary_calls.len(), 1);
    assert_eq!(scan.boundary_calls[0].target, 3);

    let map = RegionFinder::partition(&graph).unwrap();
    assert_eq!(map.region_of(4), Some(RegionId(1)));
    assert_eq!(map.regions()[1].callers, vec![0]);
}

#[test]
fn batch_analysis_matches_single_units() {
    let units: Vec<AnalysisUnit> = (0..8)
        .map(|i| {
            let mut asm = CodeAssembler::new();
            let x = asm.local(0);
            for _ in 0..i {
                asm.push_const().unwrap().store(x).unwrap().statement().unwrap();
            }
            asm.push_const().unwrap().ret_value().unwrap();
            AnalysisUnit::new(format!("unit{i}"), asm.finish().unwrap(), 1)
        })
        .collect();

    let config = AnalysisConfig::default();
    let reports = analyze_units(&units, &config, &CancellationToken::new());
    assert_eq!(reports.len(), units.len());
    for (unit, report) in units.iter().zip(&reports) {
        assert_eq!(report.name, unit.name);
        assert_eq!(report.origins, origins_of(&unit.graph, 1));
        assert_eq!(
            report.flush_plan,
            LivenessAnalyzer::new(&unit.graph, &config).flush_plan()
        );
    }
}
