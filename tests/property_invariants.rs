mod common;

use proptest::prelude::*;

use concpipe::{
    core::{cache::FormArgsCache, pipeline::PipelineSnapshot},
    engine::{
        loader::PipelineLoader,
        models::{ModelRegistry, SortConfig, SortKind, SortModel},
        replay::{ReplayExecutor, ReplayRequest},
        traits::OperationModel,
    },
    form::{FirstHitsFormArgs, FormArgs, SortAction, SortFormArgs, SwitchMainCorpusArgs},
    op::OperationRecord,
    types::FormType,
};

use common::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn step_strategy() -> impl Strategy<Value = FormType> {
    prop_oneof![
        Just(FormType::Filter),
        Just(FormType::Sample),
        Just(FormType::Shuffle),
        Just(FormType::Subhits),
        Just(FormType::FirstHits),
        Just(FormType::SwitchMainCorpus),
    ]
}

fn args_for(form_type: FormType, i: usize) -> FormArgs {
    match form_type {
        FormType::Filter => filter_args(&format!("w{i}")),
        FormType::Sample => sample_args(10 + i as u64),
        FormType::Shuffle => FormArgs::Shuffle,
        FormType::Subhits => FormArgs::Subhits,
        FormType::FirstHits => FormArgs::FirstHits(FirstHitsFormArgs {
            doc_struct: "doc".to_string(),
        }),
        FormType::SwitchMainCorpus => FormArgs::SwitchMainCorpus(SwitchMainCorpusArgs {
            maincorp: "intercorp_en".to_string(),
        }),
        _ => query_args(),
    }
}

fn action_for(form_type: FormType) -> &'static str {
    match form_type {
        FormType::Filter => "filter",
        FormType::Sample => "reduce",
        FormType::Shuffle => "shuffle",
        FormType::Subhits => "filter_subhits",
        FormType::FirstHits => "filter_firsthits",
        FormType::SwitchMainCorpus => "switch_main_corp",
        _ => "query_submit",
    }
}

fn build_steps(types: &[FormType]) -> Vec<(OperationRecord, FormArgs)> {
    let mut steps = vec![(OperationRecord::new(FormType::Query, "op0"), query_args())];
    for (i, ft) in types.iter().enumerate() {
        let idx = i + 1;
        steps.push((
            OperationRecord::new(*ft, format!("op{idx}")),
            args_for(*ft, idx),
        ));
    }
    steps
}

#[derive(Debug, Clone)]
enum SortStep {
    Activate(SortKind),
    Sync(bool),
    Forget,
}

fn sort_action_strategy() -> impl Strategy<Value = SortStep> {
    prop_oneof![
        Just(SortStep::Activate(SortKind::SingleLevel)),
        Just(SortStep::Activate(SortKind::MultiLevel)),
        any::<bool>().prop_map(SortStep::Sync),
        Just(SortStep::Forget),
    ]
}

proptest! {
    #[test]
    fn replay_submits_in_order_each_on_previous_result(
        types in prop::collection::vec(step_strategy(), 1..8),
        pick in any::<prop::sample::Index>(),
    ) {
        let steps = build_steps(&types);
        let last = steps.len() - 1;
        let changed = 1 + pick.index(last);
        let mut snapshot = snapshot_cached(&steps);
        let mut models = ModelRegistry::new();
        models
            .set_form(&steps[changed].0.persistence_id, steps[changed].1.clone())
            .expect("prime");
        let server = FakeServer::new();
        let urls = urls();

        runtime()
            .block_on(
                ReplayExecutor::new(server.as_ref(), &urls)
                    .run(ReplayRequest::through_tail(changed), &mut snapshot, &mut models, &context()),
            )
            .expect("replay");

        let mut expected: Vec<&str> = steps[changed..]
            .iter()
            .map(|(op, _)| action_for(op.form_type))
            .collect();
        if matches!(steps[last].0.form_type, FormType::Shuffle | FormType::Subhits) {
            expected.pop();
        }
        let actions = server.actions();
        prop_assert_eq!(&actions, &expected);

        let requests = server.requests();
        for (j, request) in requests.iter().enumerate() {
            let base = if j == 0 {
                format!("~op{}", changed - 1)
            } else {
                format!("~{}-{}", actions[j - 1], j)
            };
            prop_assert_eq!(query_params(&request.url, "q"), vec![base]);
        }
    }

    #[test]
    fn cold_reload_is_idempotent(types in prop::collection::vec(step_strategy(), 0..8)) {
        let steps = build_steps(&types);
        let server = FakeServer::new();
        server.serve_pipeline(pipeline_json(&steps));
        let urls = urls();
        let loader = PipelineLoader::new(server.as_ref(), &urls);
        let tail = steps[steps.len() - 1].0.persistence_id.clone();

        let rt = runtime();
        let first = rt.block_on(loader.load_full("syn2020", &tail)).expect("load");
        let second = rt.block_on(loader.load_full("syn2020", &tail)).expect("load");
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.to_cache(), snapshot_cached(&steps).forms_cache);
        let ops: Vec<OperationRecord> = steps.iter().map(|(op, _)| op.clone()).collect();
        prop_assert_eq!(first.operations, ops);
    }

    #[test]
    fn exactly_one_sort_form_active_per_key(
        actions in prop::collection::vec(sort_action_strategy(), 1..40),
    ) {
        let mut model = SortModel::default();
        for action in actions {
            match action {
                SortStep::Activate(kind) => {
                    model.activate("s", kind);
                    prop_assert!(model.is_active("s", kind));
                }
                SortStep::Sync(multi) => {
                    let args = SortFormArgs {
                        form_action: if multi { SortAction::Mlsortx } else { SortAction::Sortx },
                        sortlevel: u32::from(multi),
                        ..SortFormArgs::default()
                    };
                    model.sync_from("s", FormArgs::Sort(args)).expect("sync");
                }
                SortStep::Forget => model.forget("s"),
            }
            let single = model.is_active("s", SortKind::SingleLevel);
            let multi = model.is_active("s", SortKind::MultiLevel);
            match model.config("s") {
                Some(cfg) => {
                    prop_assert!(single != multi);
                    prop_assert_eq!(cfg.kind() == SortKind::MultiLevel, multi);
                    prop_assert!(matches!(
                        (cfg, multi),
                        (SortConfig::MultiLevel(_), true) | (SortConfig::SingleLevel(_), false)
                    ));
                }
                None => prop_assert!(!single && !multi),
            }
        }
    }

    #[test]
    fn trim_keeps_cache_aligned_with_operations(
        types in prop::collection::vec(step_strategy(), 0..10),
        pick in any::<prop::sample::Index>(),
    ) {
        let steps = build_steps(&types);
        let mut snapshot = snapshot_cached(&steps);
        snapshot.forms_cache.put_draft(sample_args(1));
        let idx = pick.index(steps.len());

        let removed = snapshot.trim_after(idx).expect("trim");
        prop_assert_eq!(snapshot.len(), idx + 1);
        prop_assert_eq!(removed.len(), steps.len() - idx - 1);
        prop_assert!(snapshot.forms_cache.all_present_for(&snapshot.operations));
        for op in &removed {
            prop_assert!(!snapshot.forms_cache.contains(&op.persistence_id));
        }

        let mut cache: FormArgsCache = snapshot.forms_cache.clone();
        cache.put("stale", FormArgs::Shuffle);
        let dropped = cache.retain_reachable(&snapshot.operations);
        prop_assert_eq!(dropped, 1);
        prop_assert!(cache.draft().is_some());
        prop_assert!(cache.missing_for(&snapshot.operations).is_empty());

        let mut fresh = PipelineSnapshot::default();
        fresh.replace(snapshot.operations.clone(), cache);
        prop_assert_eq!(fresh.tail_id(), snapshot.tail_id());
    }
}
