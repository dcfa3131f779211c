use indexmap::IndexMap;

use crate::activity::{
    Activity, Atomic, DoWhile, Flowchart, If, Messaging, MessagingKind, Parallel, Pick, Sequence,
    StateMachine, Switch, While,
};
use crate::error::Error;
use crate::parser::{ACTIVITIES_NS, TokenStream};

pub type Constructor = Box<dyn Fn() -> Box<dyn Activity> + Send + Sync>;

/// Maps qualified tag names to activity constructors.
///
/// Built once and passed by reference to every `parse` call, so composite
/// activities resolve their children through the same table.
#[derive(Default)]
pub struct Registry {
    modules: IndexMap<String, Constructor>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.modules.keys()).finish()
    }
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every activity this crate knows how to compile.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();

        for (local, label) in [
            ("Assign", "assign"),
            ("Delay", "delay"),
            ("WriteLine", "writeline"),
        ] {
            registry.insert(move || Box::new(Atomic::new(ACTIVITIES_NS, local, label)));
        }
        for kind in MessagingKind::ALL {
            registry.insert(move || Box::new(Messaging::new(kind)));
        }

        registry.insert(|| Box::<Sequence>::default());
        registry.insert(|| Box::<If>::default());
        registry.insert(|| Box::<Switch>::default());
        registry.insert(|| Box::<While>::default());
        registry.insert(|| Box::<DoWhile>::default());
        registry.insert(|| Box::<Parallel>::default());
        registry.insert(|| Box::<Pick>::default());
        registry.insert(|| Box::<Flowchart>::default());
        registry.insert(|| Box::<StateMachine>::default());
        registry
    }

    /// Adds a module under `qname`. The first registration of a name wins;
    /// later ones are logged and ignored. Returns whether it was added.
    pub fn register<F>(&mut self, qname: impl Into<String>, constructor: F) -> bool
    where
        F: Fn() -> Box<dyn Activity> + Send + Sync + 'static,
    {
        let qname = qname.into();
        if self.modules.contains_key(&qname) {
            log::warn!("module for '{qname}' is already registered, ignoring");
            return false;
        }
        log::debug!("registered module '{qname}'");
        self.modules.insert(qname, Box::new(constructor));
        true
    }

    fn insert<F>(&mut self, constructor: F)
    where
        F: Fn() -> Box<dyn Activity> + Send + Sync + 'static,
    {
        let qname = constructor().qname();
        self.register(qname, constructor);
    }

    /// A fresh activity for `qname`, or `None` when no module handles it.
    #[must_use]
    pub fn resolve(&self, qname: &str) -> Option<Box<dyn Activity>> {
        self.modules.get(qname).map(|constructor| constructor())
    }

    #[must_use]
    pub fn contains(&self, qname: &str) -> bool {
        self.modules.contains_key(qname)
    }

    pub fn qnames(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Resolves the activity whose start tag is at the front of `tokens`
    /// and lets it parse itself. `owner` names the enclosing activity in
    /// error reports.
    pub fn parse_child(
        &self,
        tokens: &mut TokenStream,
        owner: &str,
    ) -> Result<Box<dyn Activity>, Error> {
        let qname = tokens.peek_start(owner)?.qname().to_string();
        let mut activity = self.resolve(&qname).ok_or_else(|| Error::Resolution {
            qname,
            activity: owner.to_string(),
            position: tokens.position(),
        })?;
        log::debug!("parsing activity '{}'", activity.local_name());
        activity.parse(tokens, self)?;
        Ok(activity)
    }
}
