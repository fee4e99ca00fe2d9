use async_trait::async_trait;
use hashbrown::HashMap;
use tracing::debug;

use crate::{
    engine::{
        traits::{OperationModel, StepOutcome, SubmitContext},
        ReplayError,
    },
    form::{FormArgs, SortAction, SortFormArgs},
    types::FormType,
};

use super::mismatch;

/// Which sort form is active for a sort step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKind {
    SingleLevel,
    MultiLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleLevelSort {
    pub sattr: String,
    pub skey: String,
    pub spos: u32,
    pub sicase: bool,
    pub sbward: bool,
}

impl Default for SingleLevelSort {
    fn default() -> Self {
        Self {
            sattr: "word".to_string(),
            skey: "rc".to_string(),
            spos: 3,
            sicase: false,
            sbward: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortLevel {
    pub attr: String,
    pub ctx: String,
    pub pos: u32,
    pub icase: bool,
    pub bward: bool,
}

impl Default for SortLevel {
    fn default() -> Self {
        Self {
            attr: "word".to_string(),
            ctx: "0".to_string(),
            pos: 1,
            icase: false,
            bward: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiLevelSort {
    pub levels: Vec<SortLevel>,
}

impl Default for MultiLevelSort {
    fn default() -> Self {
        Self {
            levels: vec![SortLevel::default()],
        }
    }
}

/// Sort state of one operation key; the variant is the active form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortConfig {
    SingleLevel(SingleLevelSort),
    MultiLevel(MultiLevelSort),
}

impl SortConfig {
    pub fn kind(&self) -> SortKind {
        match self {
            SortConfig::SingleLevel(_) => SortKind::SingleLevel,
            SortConfig::MultiLevel(_) => SortKind::MultiLevel,
        }
    }

    pub fn default_for(kind: SortKind) -> Self {
        match kind {
            SortKind::SingleLevel => SortConfig::SingleLevel(SingleLevelSort::default()),
            SortKind::MultiLevel => SortConfig::MultiLevel(MultiLevelSort::default()),
        }
    }

    pub fn action(&self) -> SortAction {
        match self {
            SortConfig::SingleLevel(_) => SortAction::Sortx,
            SortConfig::MultiLevel(_) => SortAction::Mlsortx,
        }
    }

    pub fn from_args(args: &SortFormArgs) -> Self {
        match args.form_action {
            SortAction::Sortx => SortConfig::SingleLevel(SingleLevelSort {
                sattr: args.sattr.clone(),
                skey: args.skey.clone(),
                spos: args.spos,
                sicase: args.sicase,
                sbward: args.sbward,
            }),
            SortAction::Mlsortx => {
                // `sortlevel` comes off the wire; never build more levels than the
                // payload describes (at least one).
                let described = [
                    args.mlxattr.len(),
                    args.mlxctx.len(),
                    args.mlxpos.len(),
                    args.mlxicase.len(),
                    args.mlxbward.len(),
                ]
                .into_iter()
                .max()
                .unwrap_or(0);
                let count = match usize::try_from(args.sortlevel) {
                    Ok(0) => described,
                    Ok(level) => level.min(described.max(1)),
                    Err(_) => described.max(1),
                };
                let fallback = SortLevel::default();
                let levels = (0..count)
                    .map(|i| SortLevel {
                        attr: args.mlxattr.get(i).cloned().unwrap_or_else(|| fallback.attr.clone()),
                        ctx: args.mlxctx.get(i).cloned().unwrap_or_else(|| fallback.ctx.clone()),
                        pos: args.mlxpos.get(i).copied().unwrap_or(fallback.pos),
                        icase: args.mlxicase.get(i).copied().unwrap_or(false),
                        bward: args.mlxbward.get(i).copied().unwrap_or(false),
                    })
                    .collect();
                SortConfig::MultiLevel(MultiLevelSort { levels })
            }
        }
    }

    pub fn to_args(&self) -> SortFormArgs {
        match self {
            SortConfig::SingleLevel(s) => SortFormArgs {
                form_action: SortAction::Sortx,
                sattr: s.sattr.clone(),
                skey: s.skey.clone(),
                spos: s.spos,
                sicase: s.sicase,
                sbward: s.sbward,
                ..SortFormArgs::default()
            },
            SortConfig::MultiLevel(m) => SortFormArgs {
                form_action: SortAction::Mlsortx,
                sortlevel: m.levels.len() as u32,
                mlxattr: m.levels.iter().map(|l| l.attr.clone()).collect(),
                mlxctx: m.levels.iter().map(|l| l.ctx.clone()).collect(),
                mlxpos: m.levels.iter().map(|l| l.pos).collect(),
                mlxicase: m.levels.iter().map(|l| l.icase).collect(),
                mlxbward: m.levels.iter().map(|l| l.bward).collect(),
                ..SortFormArgs::default()
            },
        }
    }
}

/// Single- and multi-level sort forms as one tagged state per operation key.
///
/// Deactivated configurations are parked so switching back restores them.
#[derive(Debug, Default)]
pub struct SortModel {
    active: HashMap<String, SortConfig>,
    parked: HashMap<String, SortConfig>,
}

impl SortModel {
    pub fn config(&self, op_key: &str) -> Option<&SortConfig> {
        self.active.get(op_key)
    }

    pub fn active_kind(&self, op_key: &str) -> Option<SortKind> {
        self.active.get(op_key).map(SortConfig::kind)
    }

    pub fn is_active(&self, op_key: &str, kind: SortKind) -> bool {
        self.active_kind(op_key) == Some(kind)
    }

    /// Makes `kind` the active sort form of `op_key`, parking the other one.
    pub fn activate(&mut self, op_key: &str, kind: SortKind) {
        if self.is_active(op_key, kind) {
            return;
        }
        let incoming = match self.parked.remove(op_key) {
            Some(cfg) if cfg.kind() == kind => cfg,
            Some(other) => {
                self.parked.insert(op_key.to_string(), other);
                SortConfig::default_for(kind)
            }
            None => SortConfig::default_for(kind),
        };
        if let Some(outgoing) = self.active.insert(op_key.to_string(), incoming) {
            self.parked.insert(op_key.to_string(), outgoing);
        }
        debug!(op_key, ?kind, "sort form activated");
    }

    pub fn set_config(&mut self, op_key: &str, config: SortConfig) {
        if let Some(previous) = self.active.insert(op_key.to_string(), config.clone()) {
            if previous.kind() != config.kind() {
                self.parked.insert(op_key.to_string(), previous);
            }
        }
    }
}

#[async_trait]
impl OperationModel for SortModel {
    fn form_type(&self) -> FormType {
        FormType::Sort
    }

    fn sync_from(&mut self, op_key: &str, args: FormArgs) -> Result<Option<FormArgs>, ReplayError> {
        match args {
            FormArgs::Sort(form) => {
                self.set_config(op_key, SortConfig::from_args(&form));
                Ok(Some(FormArgs::Sort(form)))
            }
            FormArgs::Locked => Ok(None),
            other => Err(mismatch(FormType::Sort, &other)),
        }
    }

    fn form(&self, op_key: &str) -> Option<FormArgs> {
        self.active
            .get(op_key)
            .map(|cfg| FormArgs::Sort(cfg.to_args()))
    }

    fn forget(&mut self, op_key: &str) {
        self.active.remove(op_key);
        self.parked.remove(op_key);
    }

    fn rekey(&mut self, from: &str, to: &str) {
        if let Some(cfg) = self.active.remove(from) {
            self.active.insert(to.to_string(), cfg);
        }
        if let Some(cfg) = self.parked.remove(from) {
            self.parked.insert(to.to_string(), cfg);
        }
    }

    async fn submit(&self, op_key: &str, ctx: SubmitContext<'_>) -> Result<StepOutcome, ReplayError> {
        let config = self
            .active
            .get(op_key)
            .ok_or_else(|| ReplayError::NoActiveSortModel {
                op_key: op_key.to_string(),
            })?;
        let action = config.action();
        let body = FormArgs::Sort(config.to_args()).to_body()?;
        let next = ctx.concordance.clone();
        ctx.post_concordance(action.as_str(), body, next).await
    }
}
