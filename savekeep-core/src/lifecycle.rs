/*!
Lifecycle hooks fired around save and load.

Four observable events (before/after save, before/after load) accept any
number of subscribers. Two single-slot callbacks fire between the storage step
and the matching after-event. For one call the order is always:

- save: `BeforeSave`, `SaveCallback`, `AfterSave`
- load: `BeforeLoad`, `LoadCallback`, `AfterLoad`

A load that finds no record fires only `BeforeLoad`.
*/

use crate::options::ResolvedOptions;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleStage {
    BeforeSave,
    SaveCallback,
    AfterSave,
    BeforeLoad,
    LoadCallback,
    AfterLoad,
}

/// Payload delivered to every hook
#[derive(Debug, Clone, Copy)]
pub struct LifecycleEvent<'a> {
    pub stage: LifecycleStage,
    pub identifier: &'a str,
    /// The value being saved, or the loaded result; `None` before a load
    pub value: Option<&'a Value>,
    pub options: &'a ResolvedOptions,
}

pub type Hook = Arc<dyn Fn(&LifecycleEvent<'_>) + Send + Sync>;

/// Hook registry owned by an engine
#[derive(Default)]
pub struct Lifecycle {
    saving: RwLock<Vec<Hook>>,
    saved: RwLock<Vec<Hook>>,
    loading: RwLock<Vec<Hook>>,
    loaded: RwLock<Vec<Hook>>,
    save_callback: RwLock<Option<Hook>>,
    load_callback: RwLock<Option<Hook>>,
}

fn subscribe<F>(hooks: &RwLock<Vec<Hook>>, hook: F)
where
    F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
{
    hooks
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .push(Arc::new(hook));
}

fn replace(slot: &RwLock<Option<Hook>>, hook: Option<Hook>) {
    *slot.write().unwrap_or_else(PoisonError::into_inner) = hook;
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_saving<F>(&self, hook: F)
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        subscribe(&self.saving, hook);
    }

    pub fn on_saved<F>(&self, hook: F)
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        subscribe(&self.saved, hook);
    }

    pub fn on_loading<F>(&self, hook: F)
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        subscribe(&self.loading, hook);
    }

    pub fn on_loaded<F>(&self, hook: F)
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        subscribe(&self.loaded, hook);
    }

    /// Set the save callback, replacing any previous one
    pub fn set_save_callback<F>(&self, hook: F)
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        replace(&self.save_callback, Some(Arc::new(hook)));
    }

    /// Set the load callback, replacing any previous one
    pub fn set_load_callback<F>(&self, hook: F)
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        replace(&self.load_callback, Some(Arc::new(hook)));
    }

    pub fn clear_save_callback(&self) {
        replace(&self.save_callback, None);
    }

    pub fn clear_load_callback(&self) {
        replace(&self.load_callback, None);
    }

    /// Drop every subscriber and both callbacks
    pub fn clear_all(&self) {
        for hooks in [&self.saving, &self.saved, &self.loading, &self.loaded] {
            hooks.write().unwrap_or_else(PoisonError::into_inner).clear();
        }
        self.clear_save_callback();
        self.clear_load_callback();
    }

    /// Deliver an event to the hooks registered for its stage
    ///
    /// Hooks run after the registry lock is released, so a hook may register
    /// further hooks; those take effect from the next event.
    pub(crate) fn emit(&self, event: &LifecycleEvent<'_>) {
        let hooks: Vec<Hook> = match event.stage {
            LifecycleStage::BeforeSave => self.snapshot(&self.saving),
            LifecycleStage::AfterSave => self.snapshot(&self.saved),
            LifecycleStage::BeforeLoad => self.snapshot(&self.loading),
            LifecycleStage::AfterLoad => self.snapshot(&self.loaded),
            LifecycleStage::SaveCallback => self.callback(&self.save_callback),
            LifecycleStage::LoadCallback => self.callback(&self.load_callback),
        };

        for hook in hooks {
            hook(event);
        }
    }

    fn snapshot(&self, hooks: &RwLock<Vec<Hook>>) -> Vec<Hook> {
        hooks.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn callback(&self, slot: &RwLock<Option<Hook>>) -> Vec<Hook> {
        slot.read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = |hooks: &RwLock<Vec<Hook>>| {
            hooks.read().unwrap_or_else(PoisonError::into_inner).len()
        };
        f.debug_struct("Lifecycle")
            .field("saving", &count(&self.saving))
            .field("saved", &count(&self.saved))
            .field("loading", &count(&self.loading))
            .field("loaded", &count(&self.loaded))
            .finish_non_exhaustive()
    }
}
