//! The host CMS's content-type catalog.
//!
//! The catalog is the input to schema construction. It lists every model the host knows about,
//! grouped by application, along with the fields of each model and the set of models which are
//! flagged as snippets. Nothing in this module knows about GraphQL; it only describes the shape of
//! the data the host stores.

use crate::blocks::{Chooser, ScalarKind, StreamBlock};
use convert_case::{Case, Casing};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::Display as StrumDisplay;

/// Identifies a model class by application label and class name.
#[derive(
    Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[display(fmt = "{app}.{name}")]
pub struct ModelId {
    pub app: String,
    pub name: String,
}

impl ModelId {
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
        }
    }

    /// The lower-case model name, as used for eager-loading relations.
    pub fn model_name(&self) -> String {
        self.name.to_lowercase()
    }
}

/// The base class a model derives from in the host CMS.
#[derive(Clone, Copy, Debug, StrumDisplay, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum ModelBase {
    /// A page in the page tree.
    Page,
    /// A page which also accepts form submissions.
    Form,
    /// A site-wide settings singleton.
    Setting,
    /// Any other model.
    Model,
}

/// The kind of data stored in a model field.
#[derive(Clone, Debug)]
pub enum FieldKind {
    /// A plain attribute.
    Scalar(ScalarKind),
    /// A foreign key to a page, image or snippet.
    Reference(Chooser),
    /// A list of free-form tags.
    Tags,
    /// A stream of heterogeneous content blocks.
    Stream(StreamBlock),
}

/// A field of a model.
#[derive(Clone, Debug)]
pub struct ModelField {
    pub name: String,
    pub kind: FieldKind,
    pub description: Option<String>,
}

impl ModelField {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Everything the schema builder needs to know about one model class.
#[derive(Clone, Debug)]
pub struct ModelDescriptor {
    pub id: ModelId,
    pub base: ModelBase,
    pub verbose_name: String,
    pub fields: Vec<ModelField>,
}

impl ModelDescriptor {
    /// Describe a model with no fields.
    ///
    /// The verbose name defaults to the class name split into lower-case words, the way the host
    /// derives it when a model does not declare one.
    pub fn new(app: impl Into<String>, name: impl Into<String>, base: ModelBase) -> Self {
        let id = ModelId::new(app, name);
        let verbose_name = id.name.to_case(Case::Lower);
        Self {
            id,
            base,
            verbose_name,
            fields: vec![],
        }
    }

    pub fn page(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(app, name, ModelBase::Page)
    }

    pub fn form(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(app, name, ModelBase::Form)
    }

    pub fn setting(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(app, name, ModelBase::Setting)
    }

    pub fn model(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(app, name, ModelBase::Model)
    }

    pub fn with_verbose_name(mut self, verbose_name: impl Into<String>) -> Self {
        self.verbose_name = verbose_name.into();
        self
    }

    pub fn with_field(mut self, field: ModelField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_scalar(self, name: impl Into<String>, kind: ScalarKind) -> Self {
        self.with_field(ModelField::new(name, FieldKind::Scalar(kind)))
    }

    pub fn with_reference(self, name: impl Into<String>, target: Chooser) -> Self {
        self.with_field(ModelField::new(name, FieldKind::Reference(target)))
    }

    pub fn with_tags(self, name: impl Into<String>) -> Self {
        self.with_field(ModelField::new(name, FieldKind::Tags))
    }

    pub fn with_stream(self, name: impl Into<String>, stream: StreamBlock) -> Self {
        self.with_field(ModelField::new(name, FieldKind::Stream(stream)))
    }

    /// The stream fields declared on this model.
    pub fn stream_fields(&self) -> impl '_ + Iterator<Item = (&str, &StreamBlock)> {
        self.fields.iter().filter_map(|f| match &f.kind {
            FieldKind::Stream(stream) => Some((f.name.as_str(), stream)),
            _ => None,
        })
    }
}

/// The collection of models known to the host.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    models: Vec<ModelDescriptor>,
    snippets: BTreeSet<ModelId>,
}

impl Catalog {
    /// Add a model to the catalog.
    ///
    /// Models are kept in declaration order. Adding a model with the same ID as an existing model
    /// replaces the existing definition in place.
    pub fn add_model(&mut self, model: ModelDescriptor) {
        match self.models.iter_mut().find(|m| m.id == model.id) {
            Some(existing) => *existing = model,
            None => self.models.push(model),
        }
    }

    /// Flag a model as a snippet.
    pub fn register_snippet(&mut self, model: ModelId) {
        self.snippets.insert(model);
    }

    pub fn with_model(mut self, model: ModelDescriptor) -> Self {
        self.add_model(model);
        self
    }

    /// Add a model and flag it as a snippet.
    pub fn with_snippet(mut self, model: ModelDescriptor) -> Self {
        self.register_snippet(model.id.clone());
        self.add_model(model);
        self
    }

    pub fn is_snippet(&self, model: &ModelId) -> bool {
        self.snippets.contains(model)
    }

    pub fn model(&self, id: &ModelId) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| &m.id == id)
    }

    /// All models belonging to `app`, in declaration order.
    pub fn app_models<'a>(&'a self, app: &'a str) -> impl 'a + Iterator<Item = &'a ModelDescriptor> {
        self.models.iter().filter(move |m| m.id.app == app)
    }

    /// All models flagged as snippets, in declaration order.
    pub fn snippet_models(&self) -> impl '_ + Iterator<Item = &ModelDescriptor> {
        self.models.iter().filter(|m| self.is_snippet(&m.id))
    }

    /// The distinct application labels in the catalog, in order of first appearance.
    pub fn apps(&self) -> Vec<&str> {
        let mut apps: Vec<&str> = vec![];
        for model in &self.models {
            if !apps.contains(&model.id.app.as_str()) {
                apps.push(&model.id.app);
            }
        }
        apps
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_verbose_name() {
        let model = ModelDescriptor::setting("blog", "SocialMediaSettings");
        assert_eq!(model.verbose_name, "social media settings");
        assert_eq!(model.id.to_string(), "blog.SocialMediaSettings");
        assert_eq!(model.id.model_name(), "socialmediasettings");
    }

    #[test]
    fn test_catalog_order() {
        let catalog = Catalog::default()
            .with_model(ModelDescriptor::page("blog", "BlogPage"))
            .with_snippet(ModelDescriptor::model("people", "Author"))
            .with_model(ModelDescriptor::page("blog", "BlogIndex"))
            .with_model(ModelDescriptor::page("blog", "BlogPage").with_tags("tags"));

        assert_eq!(catalog.apps(), ["blog", "people"]);
        let blog = catalog
            .app_models("blog")
            .map(|m| m.id.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(blog, ["BlogPage", "BlogIndex"]);
        assert_eq!(
            catalog.model(&ModelId::new("blog", "BlogPage")).unwrap().fields.len(),
            1
        );
        assert!(catalog.is_snippet(&ModelId::new("people", "Author")));
        assert_eq!(catalog.snippet_models().count(), 1);
    }
}
