//! The registry of generated types.
//!
//! The registry records, for every model and block the schema builder has seen, the type that was
//! generated for it. Models are classified into exactly one of five collections (pages, forms,
//! settings, snippets and plain models); blocks and the wrapper types used for stream field union
//! members are memoized in two more. The registry is filled in while the schema is being built and
//! frozen once it is finished, after which it is only read.

use crate::blocks::BlockClass;
use crate::catalog::ModelId;
use crate::error::{Error, Result};
use crate::schema::types::{Handler, TypeDef, TypeSource, UnionDef};
use derive_more::Display;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// The five mutually exclusive classifications of a model.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Classification {
    #[display(fmt = "page")]
    Page,
    #[display(fmt = "form")]
    Form,
    #[display(fmt = "setting")]
    Setting,
    #[display(fmt = "snippet")]
    Snippet,
    #[display(fmt = "model")]
    Django,
}

/// A form page, with the types generated for the page and its submission mutation.
#[derive(Clone, Debug)]
pub struct FormEntry {
    pub model: ModelId,
    pub page: Arc<TypeDef>,
    /// The type returned by the submission mutation.
    pub result: Arc<TypeDef>,
    /// The name of the mutation field.
    pub mutation: String,
}

/// A settings model and its generated type.
#[derive(Clone, Debug)]
pub struct SettingEntry {
    pub model: ModelId,
    pub ty: Arc<TypeDef>,
}

/// An entry to [`register`](Registry::register).
#[derive(Clone, Debug)]
pub enum Entry {
    Page { model: ModelId, ty: Arc<TypeDef> },
    Form(FormEntry),
    Setting { name: String, model: ModelId, ty: Arc<TypeDef> },
    Snippet { model: ModelId, ty: Arc<TypeDef> },
    Django { model: ModelId, ty: Arc<TypeDef> },
}

impl Entry {
    fn model(&self) -> &ModelId {
        match self {
            Self::Page { model, .. }
            | Self::Setting { model, .. }
            | Self::Snippet { model, .. }
            | Self::Django { model, .. } => model,
            Self::Form(form) => &form.model,
        }
    }

    fn classification(&self) -> Classification {
        match self {
            Self::Page { .. } => Classification::Page,
            Self::Form(_) => Classification::Form,
            Self::Setting { .. } => Classification::Setting,
            Self::Snippet { .. } => Classification::Snippet,
            Self::Django { .. } => Classification::Django,
        }
    }
}

/// A key in the merged view of the registry returned by [`Registry::models`].
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegistryKey {
    #[display(fmt = "page {}", _0)]
    Page(ModelId),
    #[display(fmt = "form page {}", _0)]
    FormPage(ModelId),
    #[display(fmt = "form {}", _0)]
    Form(String),
    #[display(fmt = "setting {}", _0)]
    Setting(String),
    #[display(fmt = "snippet {}", _0)]
    Snippet(ModelId),
    #[display(fmt = "model {}", _0)]
    Django(String),
    #[display(fmt = "block {}", _0)]
    Block(BlockClass),
    #[display(fmt = "scalar block {}", _0)]
    ScalarBlock(String),
}

/// The registry of generated types.
#[derive(Clone, Debug)]
pub struct Registry {
    pages: BTreeMap<ModelId, Arc<TypeDef>>,
    forms: BTreeMap<String, FormEntry>,
    settings: BTreeMap<String, SettingEntry>,
    snippets: BTreeMap<ModelId, Arc<TypeDef>>,
    snippets_by_name: BTreeMap<String, Arc<TypeDef>>,
    django: BTreeMap<String, Arc<TypeDef>>,
    blocks: BTreeMap<BlockClass, Handler>,
    scalar_blocks: BTreeMap<String, Arc<TypeDef>>,
    unions: BTreeMap<String, Arc<UnionDef>>,
    page_prefetch_fields: BTreeSet<String>,
    classified: BTreeMap<ModelId, Classification>,
    /// The owner of every generated type name, used to detect collisions.
    names: BTreeMap<String, String>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            pages: Default::default(),
            forms: Default::default(),
            settings: Default::default(),
            snippets: Default::default(),
            snippets_by_name: Default::default(),
            django: Default::default(),
            blocks: Default::default(),
            scalar_blocks: Default::default(),
            unions: Default::default(),
            page_prefetch_fields: ["content_type", "owner", "live_revision", "page_ptr"]
                .into_iter()
                .map(String::from)
                .collect(),
            classified: Default::default(),
            names: Default::default(),
        }
    }
}

impl Registry {
    /// Reserve a GraphQL type name for `owner`.
    ///
    /// Reserving the same name twice for the same owner is allowed; reserving a name which belongs
    /// to a different owner is a [`NameCollision`](Error::NameCollision).
    pub fn claim_name(&mut self, name: &str, owner: impl ToString) -> Result<()> {
        let owner = owner.to_string();
        self.check_name(name, &owner)?;
        self.names.insert(name.into(), owner);
        Ok(())
    }

    /// Check that `name` is free or already belongs to `owner`, without reserving it.
    fn check_name(&self, name: &str, owner: &str) -> Result<()> {
        match self.names.get(name) {
            Some(existing) if existing != owner => Err(Error::NameCollision {
                name: name.into(),
                existing: existing.clone(),
                requested: owner.into(),
            }),
            _ => Ok(()),
        }
    }

    /// The classification of `model`, if it has been registered.
    pub fn classification(&self, model: &ModelId) -> Option<Classification> {
        self.classified.get(model).copied()
    }

    pub fn is_registered(&self, model: &ModelId) -> bool {
        self.classified.contains_key(model)
    }

    /// Record the type generated for a model.
    ///
    /// Registering a model again under the same classification replaces its type. Registering it
    /// under a different classification fails, leaving the registry unchanged.
    pub fn register(&mut self, entry: Entry) -> Result<()> {
        let model = entry.model().clone();
        let classification = entry.classification();
        if let Some(existing) = self.classification(&model) {
            if existing != classification {
                return Err(Error::Reclassified {
                    model,
                    existing,
                    requested: classification,
                });
            }
        }

        match &entry {
            Entry::Form(form) => {
                let page_owner = RegistryKey::FormPage(model.clone()).to_string();
                let result_owner = RegistryKey::Form(form.page.name.clone()).to_string();
                self.check_name(&form.page.name, &page_owner)?;
                self.check_name(&form.result.name, &result_owner)?;
                self.claim_name(&form.page.name, page_owner)?;
                self.claim_name(&form.result.name, result_owner)?;
            }
            Entry::Setting { name, ty, .. } => {
                if let Some(existing) = self.settings.get(name) {
                    if existing.model != model {
                        return Err(Error::NameCollision {
                            name: name.clone(),
                            existing: format!("{classification} {}", existing.model),
                            requested: format!("{classification} {model}"),
                        });
                    }
                }
                self.claim_name(&ty.name, format!("{classification} {model}"))?;
            }
            Entry::Page { ty, .. } | Entry::Snippet { ty, .. } | Entry::Django { ty, .. } => {
                self.claim_name(&ty.name, format!("{classification} {model}"))?;
            }
        }

        debug!(%model, %classification, "registered model");
        self.classified.insert(model.clone(), classification);
        match entry {
            Entry::Page { model, ty } => {
                self.pages.insert(model, ty);
            }
            Entry::Form(form) => {
                self.forms.insert(form.page.name.clone(), form);
            }
            Entry::Setting { name, model, ty } => {
                self.settings.insert(name, SettingEntry { model, ty });
            }
            Entry::Snippet { model, ty } => {
                self.snippets_by_name.insert(ty.name.clone(), ty.clone());
                self.snippets.insert(model, ty);
            }
            Entry::Django { ty, .. } => {
                self.django.insert(ty.name.clone(), ty);
            }
        }
        Ok(())
    }

    /// Memoize the handler for a block class.
    ///
    /// If a handler is already registered for `class`, it is kept and returned, and `handler` is
    /// discarded.
    pub fn insert_block(&mut self, class: BlockClass, handler: Handler) -> Result<Handler> {
        if let Some(existing) = self.blocks.get(&class) {
            return Ok(existing.clone());
        }
        if let Handler::Object(ty) = &handler {
            self.claim_name(&ty.name, RegistryKey::Block(class.clone()))?;
        }
        self.blocks.insert(class, handler.clone());
        Ok(handler)
    }

    /// Memoize a wrapper type for union members.
    ///
    /// If a wrapper is already registered for `key`, it is kept and returned.
    pub fn insert_scalar_block(&mut self, key: String, ty: TypeDef) -> Result<Arc<TypeDef>> {
        if let Some(existing) = self.scalar_blocks.get(&key) {
            return Ok(existing.clone());
        }
        self.claim_name(&ty.name, RegistryKey::ScalarBlock(key.clone()))?;
        let ty = Arc::new(ty);
        self.scalar_blocks.insert(key, ty.clone());
        Ok(ty)
    }

    pub fn insert_union(&mut self, union: UnionDef) -> Result<Arc<UnionDef>> {
        self.claim_name(&union.name, format!("union {}", union.name))?;
        let union = Arc::new(union);
        self.unions.insert(union.name.clone(), union.clone());
        Ok(union)
    }

    pub fn add_prefetch_field(&mut self, field: impl Into<String>) {
        self.page_prefetch_fields.insert(field.into());
    }

    /// Merge the contents of `other` into this registry.
    ///
    /// Entries are merged under the same rules as [`register`](Self::register): a model
    /// classified differently by the two registries, or a type name claimed by different owners,
    /// is an error. Memoized blocks already present in `self` take precedence.
    pub fn merge(&mut self, other: Registry) -> Result<()> {
        for (model, ty) in other.pages {
            self.register(Entry::Page { model, ty })?;
        }
        for (_, form) in other.forms {
            self.register(Entry::Form(form))?;
        }
        for (name, SettingEntry { model, ty }) in other.settings {
            self.register(Entry::Setting { name, model, ty })?;
        }
        for (model, ty) in other.snippets {
            self.register(Entry::Snippet { model, ty })?;
        }
        for ty in other.django.into_values() {
            if let TypeSource::Model(model) = ty.source.clone() {
                self.register(Entry::Django { model, ty })?;
            }
        }
        for (class, handler) in other.blocks {
            self.insert_block(class, handler)?;
        }
        for (key, ty) in other.scalar_blocks {
            if !self.scalar_blocks.contains_key(&key) {
                self.claim_name(&ty.name, RegistryKey::ScalarBlock(key.clone()))?;
                self.scalar_blocks.insert(key, ty);
            }
        }
        for (name, union) in other.unions {
            if !self.unions.contains_key(&name) {
                self.claim_name(&name, format!("union {name}"))?;
                self.unions.insert(name, union);
            }
        }
        self.page_prefetch_fields.extend(other.page_prefetch_fields);
        Ok(())
    }

    pub fn pages(&self) -> &BTreeMap<ModelId, Arc<TypeDef>> {
        &self.pages
    }

    pub fn forms(&self) -> &BTreeMap<String, FormEntry> {
        &self.forms
    }

    pub fn settings(&self) -> &BTreeMap<String, SettingEntry> {
        &self.settings
    }

    pub fn snippets_by_name(&self) -> &BTreeMap<String, Arc<TypeDef>> {
        &self.snippets_by_name
    }

    pub fn django(&self) -> &BTreeMap<String, Arc<TypeDef>> {
        &self.django
    }

    pub fn blocks(&self) -> &BTreeMap<BlockClass, Handler> {
        &self.blocks
    }

    pub fn scalar_blocks(&self) -> &BTreeMap<String, Arc<TypeDef>> {
        &self.scalar_blocks
    }

    pub fn unions(&self) -> &BTreeMap<String, Arc<UnionDef>> {
        &self.unions
    }

    pub fn page_prefetch_fields(&self) -> &BTreeSet<String> {
        &self.page_prefetch_fields
    }

    /// The type generated for a page model.
    pub fn page(&self, model: &ModelId) -> Result<&Arc<TypeDef>> {
        self.pages
            .get(model)
            .ok_or_else(|| Error::not_found("page type", model))
    }

    /// The type generated for a page or form page model.
    pub fn page_type(&self, model: &ModelId) -> Result<&Arc<TypeDef>> {
        self.page(model).or_else(|_| {
            self.forms
                .values()
                .find(|form| &form.model == model)
                .map(|form| &form.page)
                .ok_or_else(|| Error::not_found("page type", model))
        })
    }

    pub fn form(&self, node: &str) -> Result<&FormEntry> {
        self.forms
            .get(node)
            .ok_or_else(|| Error::not_found("form", node))
    }

    pub fn setting(&self, name: &str) -> Result<&SettingEntry> {
        self.settings
            .get(name)
            .ok_or_else(|| Error::not_found("settings", name))
    }

    pub fn snippet(&self, model: &ModelId) -> Result<&Arc<TypeDef>> {
        self.snippets
            .get(model)
            .ok_or_else(|| Error::not_found("snippet", model))
    }

    pub fn snippet_by_name(&self, name: &str) -> Result<&Arc<TypeDef>> {
        self.snippets_by_name
            .get(name)
            .ok_or_else(|| Error::not_found("snippet type", name))
    }

    pub fn block(&self, class: &BlockClass) -> Result<&Handler> {
        self.blocks
            .get(class)
            .ok_or_else(|| Error::not_found("block", class))
    }

    pub fn scalar_block(&self, key: &str) -> Result<&Arc<TypeDef>> {
        self.scalar_blocks
            .get(key)
            .ok_or_else(|| Error::not_found("scalar block", key))
    }

    /// The merged view of all generated types, keyed by what they were generated for.
    ///
    /// This includes every classified model, every memoized block which is exposed as a plain
    /// object type, and every union member wrapper type. Values are GraphQL type names, which are
    /// unique across the registry, so the mapping can be inverted by [`rmodels`](Self::rmodels).
    pub fn models(&self) -> BTreeMap<RegistryKey, String> {
        let mut models = BTreeMap::new();
        models.extend(
            self.pages
                .iter()
                .map(|(model, ty)| (RegistryKey::Page(model.clone()), ty.name.clone())),
        );
        models.extend(
            self.snippets
                .iter()
                .map(|(model, ty)| (RegistryKey::Snippet(model.clone()), ty.name.clone())),
        );
        for (node, form) in &self.forms {
            models.insert(RegistryKey::FormPage(form.model.clone()), node.clone());
            models.insert(RegistryKey::Form(node.clone()), form.result.name.clone());
        }
        models.extend(
            self.django
                .keys()
                .map(|node| (RegistryKey::Django(node.clone()), node.clone())),
        );
        models.extend(
            self.settings
                .iter()
                .map(|(name, entry)| (RegistryKey::Setting(name.clone()), entry.ty.name.clone())),
        );
        models.extend(self.blocks.iter().filter_map(|(class, handler)| match handler {
            Handler::Object(ty) => Some((RegistryKey::Block(class.clone()), ty.name.clone())),
            _ => None,
        }));
        models.extend(
            self.scalar_blocks
                .iter()
                .map(|(key, ty)| (RegistryKey::ScalarBlock(key.clone()), ty.name.clone())),
        );
        models
    }

    /// The inverse of [`models`](Self::models).
    pub fn rmodels(&self) -> BTreeMap<String, RegistryKey> {
        self.models().into_iter().map(|(k, v)| (v, k)).collect()
    }

    /// Snippet models and the names of their generated types.
    pub fn snippets(&self) -> BTreeMap<ModelId, String> {
        self.snippets
            .iter()
            .map(|(model, ty)| (model.clone(), ty.name.clone()))
            .collect()
    }

    /// The inverse of [`snippets`](Self::snippets).
    pub fn rsnippets(&self) -> BTreeMap<String, ModelId> {
        self.snippets()
            .into_iter()
            .map(|(model, name)| (name, model))
            .collect()
    }

    /// Every generated object type, for registration with the final schema.
    pub fn types(&self) -> impl '_ + Iterator<Item = &Arc<TypeDef>> {
        self.pages
            .values()
            .chain(self.forms.values().flat_map(|form| [&form.page, &form.result]))
            .chain(self.settings.values().map(|entry| &entry.ty))
            .chain(self.snippets.values())
            .chain(self.django.values())
            .chain(self.blocks.values().filter_map(|handler| match handler {
                Handler::Object(ty) => Some(ty),
                _ => None,
            }))
            .chain(self.scalar_blocks.values())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blocks::ScalarKind;
    use proptest::{prelude::*, test_runner::Config};

    fn ty(name: &str, model: &ModelId) -> Arc<TypeDef> {
        Arc::new(TypeDef::new(name, TypeSource::Model(model.clone())))
    }

    #[test]
    fn test_reclassification() {
        let mut registry = Registry::default();
        let model = ModelId::new("home", "HomePage");
        registry
            .register(Entry::Page {
                model: model.clone(),
                ty: ty("HomeHomePage", &model),
            })
            .unwrap();
        // Same classification is fine.
        registry
            .register(Entry::Page {
                model: model.clone(),
                ty: ty("HomeHomePage", &model),
            })
            .unwrap();

        let err = registry
            .register(Entry::Snippet {
                model: model.clone(),
                ty: ty("HomeHomePage", &model),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Reclassified {
                existing: Classification::Page,
                requested: Classification::Snippet,
                ..
            }
        ));
        assert!(registry.snippets().is_empty());
    }

    #[test]
    fn test_name_collision() {
        let mut registry = Registry::default();
        let a = ModelId::new("a", "Thing");
        let b = ModelId::new("b", "Thing");
        registry
            .register(Entry::Django {
                model: a.clone(),
                ty: ty("Thing", &a),
            })
            .unwrap();
        let err = registry
            .register(Entry::Django {
                model: b.clone(),
                ty: ty("Thing", &b),
            })
            .unwrap_err();
        assert!(matches!(err, Error::NameCollision { .. }), "{err}");
        assert!(!registry.is_registered(&b));
    }

    #[test]
    fn test_settings_name_collision() {
        let mut registry = Registry::default();
        let a = ModelId::new("a", "SocialMediaSettings");
        let b = ModelId::new("b", "SocialMediaSettings");
        registry
            .register(Entry::Setting {
                name: "SocialMediaSettings".into(),
                model: a.clone(),
                ty: ty("ASocialMediaSettings", &a),
            })
            .unwrap();
        let err = registry
            .register(Entry::Setting {
                name: "SocialMediaSettings".into(),
                model: b.clone(),
                ty: ty("BSocialMediaSettings", &b),
            })
            .unwrap_err();
        assert!(matches!(err, Error::NameCollision { .. }), "{err}");
        assert!(!registry.is_registered(&b));
        assert_eq!(registry.setting("SocialMediaSettings").unwrap().model, a);
        assert!(registry.types().any(|t| t.name == "ASocialMediaSettings"));
    }

    #[test]
    fn test_failed_form_keeps_names_free() {
        let mut registry = Registry::default();
        let other = ModelId::new("b", "Thing");
        registry
            .register(Entry::Django {
                model: other.clone(),
                ty: ty("AFormMutation", &other),
            })
            .unwrap();

        let form = ModelId::new("a", "Form");
        let err = registry
            .register(Entry::Form(FormEntry {
                model: form.clone(),
                page: ty("AForm", &form),
                result: Arc::new(TypeDef::new("AFormMutation", TypeSource::FormResult(form.clone()))),
                mutation: "aForm".into(),
            }))
            .unwrap_err();
        assert!(matches!(err, Error::NameCollision { .. }), "{err}");

        // The page name was not left reserved by the failed registration.
        let page = ModelId::new("c", "Page");
        registry
            .register(Entry::Page {
                model: page.clone(),
                ty: ty("AForm", &page),
            })
            .unwrap();
    }

    #[test]
    fn test_not_found() {
        let registry = Registry::default();
        let model = ModelId::new("home", "HomePage");
        assert!(matches!(registry.page(&model), Err(Error::NotFound { .. })));
        assert!(matches!(registry.setting("Nope"), Err(Error::NotFound { .. })));
        assert!(matches!(
            registry.block(&"CharBlock".into()),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_block_memoization() {
        let mut registry = Registry::default();
        let class = BlockClass::new("home.blocks.Quote");
        let first = Arc::new(TypeDef::new("HomeQuote", TypeSource::Block(class.clone())));
        let second = Arc::new(TypeDef::new("HomeQuote", TypeSource::Block(class.clone())));
        registry
            .insert_block(class.clone(), Handler::Object(first.clone()))
            .unwrap();
        let Handler::Object(kept) = registry
            .insert_block(class.clone(), Handler::Object(second))
            .unwrap()
        else {
            panic!("expected an object handler");
        };
        assert!(Arc::ptr_eq(&kept, &first));
    }

    #[test]
    fn test_merge() {
        let model = ModelId::new("home", "HomePage");
        let mut a = Registry::default();
        let mut b = Registry::default();
        b.register(Entry::Page {
            model: model.clone(),
            ty: ty("HomeHomePage", &model),
        })
        .unwrap();
        b.add_prefetch_field("homepage");
        a.merge(b.clone()).unwrap();
        assert_eq!(a.models(), b.models());
        assert!(a.page_prefetch_fields().contains("homepage"));

        let mut c = Registry::default();
        c.register(Entry::Django {
            model: model.clone(),
            ty: ty("HomeHomePage", &model),
        })
        .unwrap();
        assert!(a.merge(c).is_err());
    }

    fn entry() -> impl Strategy<Value = Entry> {
        ("[a-c]", "[A-D][a-z]{0,3}", 0..5u8).prop_map(|(app, name, kind)| {
            let model = ModelId::new(app, name);
            let node = format!("{}{}", model.app.to_uppercase(), model.name);
            let ty = ty(&node, &model);
            match kind {
                0 => Entry::Page { model, ty },
                1 => Entry::Form(FormEntry {
                    result: Arc::new(TypeDef::new(
                        format!("{node}Mutation"),
                        TypeSource::FormResult(model.clone()),
                    )),
                    mutation: node.clone(),
                    model,
                    page: ty,
                }),
                // Settings from different apps may share a name.
                2 => Entry::Setting {
                    name: model.name.clone(),
                    model,
                    ty,
                },
                3 => Entry::Snippet { model, ty },
                _ => Entry::Django { model, ty },
            }
        })
    }

    proptest! {
        #![proptest_config(Config {
            cases: 64,
            ..Default::default()
        })]

        #[test]
        fn test_models_round_trip(entries in prop::collection::vec(entry(), 0..20)) {
            let mut registry = Registry::default();
            for entry in entries {
                // Conflicting entries are rejected; the rest must keep the registry consistent.
                let _ = registry.register(entry);
            }
            let scalar = TypeDef::new("CharBlock", TypeSource::Wrapper("Char".into()));
            registry.insert_scalar_block("Char".into(), scalar).unwrap();
            registry.insert_block(ScalarKind::Char.class(), Handler::Scalar(ScalarKind::Char)).unwrap();

            let models = registry.models();
            let rmodels = registry.rmodels();
            prop_assert_eq!(models.len(), rmodels.len());
            for (k, v) in &models {
                prop_assert_eq!(&rmodels[v], k);
            }
            for (k, v) in &registry.snippets() {
                prop_assert_eq!(&registry.rsnippets()[v], k);
            }

            // Every registered model is in exactly one collection.
            for (model, classification) in &registry.classified {
                let homes = [
                    registry.pages.contains_key(model),
                    registry.forms.values().any(|f| &f.model == model),
                    registry.settings.values().any(|s| &s.model == model),
                    registry.snippets.contains_key(model),
                    registry.django.values().any(|t| t.source == TypeSource::Model(model.clone())),
                ];
                prop_assert_eq!(homes.iter().filter(|h| **h).count(), 1, "{} {}", model, classification);
            }
        }
    }
}
