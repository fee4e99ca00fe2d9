#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hashbrown::HashMap;
use serde_json::{Value, json};

use concpipe::{
    context::ConcordanceContext,
    core::{cache::FormArgsCache, pipeline::PipelineSnapshot},
    form::{
        FilterFormArgs, FilterPolarity, FormArgs, QueryFormArgs, QuerySpec, QueryType,
        SampleFormArgs, SortFormArgs,
    },
    op::OperationRecord,
    transport::{HttpRequest, Transport, TransportError, UrlBuilder},
    types::FormType,
};

pub const ROOT: &str = "http://kontext.test";

/// Routes engine logs to the test writer; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Records every request and answers like a concordance server.
///
/// Submit actions get a fresh persistence id `<action>-<n>`, `n` being the
/// 1-based position of the request in the log.
#[derive(Default)]
pub struct FakeServer {
    requests: Mutex<Vec<HttpRequest>>,
    pipeline: Mutex<Option<Value>>,
    form_args: Mutex<HashMap<usize, Value>>,
    failures: Mutex<HashMap<String, TransportError>>,
    overview_on: Mutex<HashMap<String, Value>>,
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve_pipeline(&self, value: Value) {
        *self.pipeline.lock().expect("lock") = Some(value);
    }

    pub fn serve_form_args(&self, idx: usize, args: &FormArgs) {
        self.form_args
            .lock()
            .expect("lock")
            .insert(idx, serde_json::to_value(args).expect("encode"));
    }

    pub fn fail(&self, action: &str, err: TransportError) {
        self.failures
            .lock()
            .expect("lock")
            .insert(action.to_string(), err);
    }

    /// Responses of `action` carry `overview` as their `query_overview`.
    pub fn overview_on(&self, action: &str, overview: Value) {
        self.overview_on
            .lock()
            .expect("lock")
            .insert(action.to_string(), overview);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("lock").clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.requests().iter().map(|r| action_of(&r.url)).collect()
    }

    pub fn count(&self, action: &str) -> usize {
        self.actions().iter().filter(|a| a.as_str() == action).count()
    }

    pub fn request_for(&self, action: &str) -> HttpRequest {
        self.requests()
            .into_iter()
            .find(|r| action_of(&r.url) == action)
            .unwrap_or_else(|| panic!("no {action} request"))
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn send(&self, request: HttpRequest) -> Result<Value, TransportError> {
        let action = action_of(&request.url);
        let n = {
            let mut log = self.requests.lock().expect("lock");
            log.push(request.clone());
            log.len()
        };
        if let Some(err) = self.failures.lock().expect("lock").get(&action) {
            return Err(err.clone());
        }
        match action.as_str() {
            "load_query_pipeline" => self
                .pipeline
                .lock()
                .expect("lock")
                .clone()
                .ok_or(TransportError::Status(404)),
            "ajax_fetch_conc_form_args" => {
                let idx = query_params(&request.url, "idx")
                    .first()
                    .and_then(|v| v.parse::<usize>().ok())
                    .ok_or(TransportError::Status(400))?;
                self.form_args
                    .lock()
                    .expect("lock")
                    .get(&idx)
                    .cloned()
                    .ok_or(TransportError::Status(404))
            }
            _ => {
                let mut body = json!({
                    "conc_persistence_op_id": format!("{action}-{n}"),
                    "concsize": 1000 - n as u64,
                    "fullsize": 1000,
                });
                if let Some(overview) = self.overview_on.lock().expect("lock").get(&action) {
                    body["query_overview"] = overview.clone();
                }
                Ok(body)
            }
        }
    }
}

pub fn action_of(url: &str) -> String {
    let path = url
        .strip_prefix(ROOT)
        .unwrap_or(url)
        .trim_start_matches('/');
    path.split('?').next().unwrap_or_default().to_string()
}

/// Raw (still percent-encoded) values of `key` in `url`, in order.
pub fn query_params(url: &str, key: &str) -> Vec<String> {
    let Some((_, query)) = url.split_once('?') else {
        return Vec::new();
    };
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .filter(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
        .collect()
}

pub fn urls() -> UrlBuilder {
    UrlBuilder::new(ROOT)
}

pub fn context() -> ConcordanceContext {
    ConcordanceContext::new("syn2020")
}

pub fn query_args() -> FormArgs {
    FormArgs::Query(QueryFormArgs {
        corpname: "syn2020".to_string(),
        usesubcorp: None,
        maincorp: None,
        queries: vec![QuerySpec {
            corpname: "syn2020".to_string(),
            qtype: QueryType::Advanced,
            query: "[lemma=\"pes\"]".to_string(),
            default_attr: None,
            pcq_pos_neg: None,
            include_empty: false,
        }],
        text_types: Default::default(),
        shuffle: true,
    })
}

pub fn filter_args(query: &str) -> FormArgs {
    FormArgs::Filter(FilterFormArgs {
        maincorp: None,
        query_type: QueryType::Simple,
        query: query.to_string(),
        default_attr: Some("word".to_string()),
        pnfilter: FilterPolarity::Positive,
        filfl: "f".to_string(),
        filfpos: "-5".to_string(),
        filtpos: "5".to_string(),
        inclkwic: true,
        within: false,
    })
}

pub fn sort_args() -> FormArgs {
    FormArgs::Sort(SortFormArgs {
        sattr: "word".to_string(),
        skey: "rc".to_string(),
        spos: 3,
        ..SortFormArgs::default()
    })
}

pub fn sample_args(rlines: u64) -> FormArgs {
    FormArgs::Sample(SampleFormArgs { rlines })
}

/// `[QUERY(a), FILTER(b), SORT(c)]` with the args of every step.
pub fn query_filter_sort() -> Vec<(OperationRecord, FormArgs)> {
    vec![
        (OperationRecord::new(FormType::Query, "a"), query_args()),
        (OperationRecord::new(FormType::Filter, "b"), filter_args("kočka")),
        (OperationRecord::new(FormType::Sort, "c"), sort_args()),
    ]
}

pub fn snapshot_cached(steps: &[(OperationRecord, FormArgs)]) -> PipelineSnapshot {
    let mut cache = FormArgsCache::new();
    for (op, args) in steps {
        cache.put(op.persistence_id.clone(), args.clone());
    }
    PipelineSnapshot::new(steps.iter().map(|(op, _)| op.clone()).collect(), cache)
}

pub fn snapshot_cold(steps: &[(OperationRecord, FormArgs)]) -> PipelineSnapshot {
    PipelineSnapshot::new(
        steps.iter().map(|(op, _)| op.clone()).collect(),
        FormArgsCache::new(),
    )
}

/// `load_query_pipeline` payload for `steps`.
pub fn pipeline_json(steps: &[(OperationRecord, FormArgs)]) -> Value {
    let ops: Vec<Value> = steps
        .iter()
        .map(|(op, args)| {
            json!({
                "id": op.persistence_id,
                "form_args": serde_json::to_value(args).expect("encode"),
            })
        })
        .collect();
    let overview: Vec<Value> = steps
        .iter()
        .map(|(op, _)| serde_json::to_value(op).expect("encode"))
        .collect();
    json!({"ops": ops, "query_overview": overview, "messages": []})
}
