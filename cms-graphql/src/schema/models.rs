//! Registration of an application's models.

use super::pages::PAGE_FIELDS;
use super::streamfield::{reference, stream_field, stream_union_name};
use super::types::{FieldDef, FieldPlan, TypeDef, TypeSource};
use super::SchemaBuilder;
use crate::catalog::{Catalog, FieldKind, ModelBase, ModelDescriptor, ModelId};
use crate::error::{Error, Result};
use crate::registry::{Entry, FormEntry};
use convert_case::{Case, Casing};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Capitalize the first character of `s`, leaving the rest unchanged.
pub fn capfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Capitalize the first character of `s` and lower-case the rest.
fn capitalize(s: &str) -> String {
    capfirst(&s.to_lowercase())
}

/// Expand a naming prefix template.
///
/// `{app}` is replaced with the capitalized application label, so `test_app_1` becomes
/// `Test_app_1`, and `{cls}` with the class name.
pub fn format_prefix(template: &str, app: &str, class: &str) -> String {
    template
        .replace("{app}", &capitalize(app))
        .replace("{cls}", class)
}

impl SchemaBuilder {
    /// Register every application listed in the settings, with its configured prefix.
    pub fn register_applications(&mut self, catalog: &Catalog) -> Result<()> {
        for app in self.settings.apps.clone() {
            let prefix = self.settings.prefix.for_app(&app).to_string();
            self.register_application(catalog, &app, &prefix, &[])?;
        }
        Ok(())
    }

    /// Register the models of `app`.
    ///
    /// Snippet models are registered first, so that references to them from other models of the
    /// same application can be resolved. Models in `exclude` and models which are already
    /// registered are skipped, which makes registering an application again a no-op.
    pub fn register_application(
        &mut self,
        catalog: &Catalog,
        app: &str,
        prefix: &str,
        exclude: &[ModelId],
    ) -> Result<()> {
        info!(app, prefix, "registering application");
        let candidates = || {
            catalog
                .app_models(app)
                .filter(|model| !exclude.contains(&model.id))
        };

        for model in candidates().filter(|model| catalog.is_snippet(&model.id)) {
            if !self.registry.is_registered(&model.id) {
                self.register_snippet(model, prefix)?;
            }
        }
        for model in candidates() {
            if self.registry.is_registered(&model.id) {
                continue;
            }
            if catalog.is_snippet(&model.id) {
                return Err(Error::UnregisteredSnippet {
                    model: model.id.clone(),
                });
            }
            self.register_model(model, prefix)?;
        }
        Ok(())
    }

    fn register_snippet(&mut self, model: &ModelDescriptor, prefix: &str) -> Result<()> {
        let prefix = format_prefix(prefix, &model.id.app, &model.id.name);
        let node = format!("{prefix}{}", model.id.name);
        let ty = self.model_type(model, &node, &prefix, false)?;
        self.registry.register(Entry::Snippet {
            model: model.id.clone(),
            ty: Arc::new(ty),
        })
    }

    fn register_model(&mut self, model: &ModelDescriptor, prefix: &str) -> Result<()> {
        let prefix = format_prefix(prefix, &model.id.app, &model.id.name);
        let node = format!("{prefix}{}", model.id.name);
        let prefix = prefix.as_str();
        match model.base {
            ModelBase::Form => {
                let mut page = self.model_type(model, &node, prefix, true)?;
                page.fields.push(
                    FieldDef::new("formFields", "form_fields", FieldPlan::FormFields)
                        .with_description(Some("The fields of the form.".into())),
                );
                let result = TypeDef::new(
                    format!("{node}Mutation"),
                    TypeSource::FormResult(model.id.clone()),
                );
                self.registry.register(Entry::Form(FormEntry {
                    model: model.id.clone(),
                    page: Arc::new(page),
                    result: Arc::new(result),
                    mutation: node.to_case(Case::Camel),
                }))?;
                self.registry.add_prefetch_field(model.id.model_name());
            }
            ModelBase::Page => {
                let ty = self.model_type(model, &node, prefix, true)?;
                self.registry.register(Entry::Page {
                    model: model.id.clone(),
                    ty: Arc::new(ty),
                })?;
                self.registry.add_prefetch_field(model.id.model_name());
            }
            ModelBase::Setting => {
                let ty = self.model_type(model, &node, prefix, false)?;
                self.registry.register(Entry::Setting {
                    name: capfirst(&model.verbose_name),
                    model: model.id.clone(),
                    ty: Arc::new(ty),
                })?;
                self.registry.add_prefetch_field(model.id.model_name());
            }
            ModelBase::Model => {
                let ty = self.model_type(model, &node, prefix, false)?;
                self.registry.register(Entry::Django {
                    model: model.id.clone(),
                    ty: Arc::new(ty),
                })?;
            }
        }
        Ok(())
    }

    /// Synthesize the type for a model.
    ///
    /// `prefix` is the expanded naming prefix, which is also used for struct blocks declared by the
    /// model's stream fields.
    ///
    /// Page types get the fields of the page interface when the schema is assembled, so model
    /// fields with the same names are dropped. Other types get an `id` field.
    fn model_type(
        &mut self,
        model: &ModelDescriptor,
        node: &str,
        prefix: &str,
        is_page: bool,
    ) -> Result<TypeDef> {
        let mut ty = TypeDef::new(node, TypeSource::Model(model.id.clone()));
        ty.description = Some(capfirst(&model.verbose_name));
        if is_page {
            ty.interfaces.push(super::PAGE_INTERFACE.into());
        } else {
            ty.fields.push(FieldDef::new("id", "id", FieldPlan::Id));
        }

        for field in &model.fields {
            let name = field.name.to_case(Case::Camel);
            if (is_page && PAGE_FIELDS.contains(&name.as_str())) || ty.field(&name).is_some() {
                warn!(model = %model.id, field = %name, "field shadows a built-in field, skipping");
                continue;
            }
            let plan = match &field.kind {
                FieldKind::Scalar(kind) => FieldPlan::Attribute(kind.primitive()),
                FieldKind::Reference(chooser) => FieldPlan::Reference(reference(&self.registry, chooser)?),
                FieldKind::Tags => FieldPlan::Tags,
                FieldKind::Stream(stream) if stream.children.is_empty() => {
                    warn!(model = %model.id, field = %field.name, "stream field accepts no blocks, skipping");
                    continue;
                }
                FieldKind::Stream(stream) => FieldPlan::Stream(stream_field(
                    &mut self.registry,
                    stream_union_name(node, &field.name),
                    stream,
                    prefix,
                )?),
            };
            ty.fields.push(
                FieldDef::new(name, field.name.clone(), plan)
                    .with_description(field.description.clone()),
            );
        }

        debug!(name = %ty.name, model = %model.id, fields = ty.fields.len(), "built model type");
        Ok(ty)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blocks::{Block, Chooser, ScalarKind, StreamBlock, StructBlock};
    use crate::config::{ApiSettings, Prefix};
    use crate::registry::{Classification, RegistryKey};
    use crate::schema::types::Handler;
    use std::collections::BTreeMap;

    fn catalog() -> Catalog {
        let quote = StructBlock::new("test_app_1.blocks.Quote")
            .child("text", ScalarKind::Text)
            .child("pages", Block::list(Chooser::Page));
        Catalog::default()
            .with_model(
                ModelDescriptor::page("test_app_1", "TestPage")
                    .with_scalar("subtitle", ScalarKind::Char)
                    .with_scalar("title", ScalarKind::Char)
                    .with_reference("author", Chooser::Snippet(ModelId::new("test_app_1", "Author")))
                    .with_stream(
                        "body",
                        StreamBlock::default()
                            .block("h1", ScalarKind::Char)
                            .block("n1", ScalarKind::Decimal)
                            .block("quote", quote.clone()),
                    )
                    .with_stream(
                        "extra_body",
                        StreamBlock::default().block("quote", quote),
                    ),
            )
            .with_model(ModelDescriptor::form("test_app_1", "ContactPage"))
            .with_model(
                ModelDescriptor::setting("test_app_1", "SocialMediaSettings")
                    .with_scalar("twitter", ScalarKind::Url),
            )
            .with_model(ModelDescriptor::model("test_app_1", "Advert"))
            // Declared after the page which refers to it; snippets are registered first anyway.
            .with_snippet(
                ModelDescriptor::model("test_app_1", "Author").with_scalar("name", ScalarKind::Char),
            )
    }

    #[test]
    fn test_prefix() {
        assert_eq!(format_prefix("{app}", "test_app_1", "TestPage"), "Test_app_1");
        assert_eq!(format_prefix("{app}{cls}_", "home", "X"), "HomeX_");
        assert_eq!(format_prefix("", "home", "X"), "");
        assert_eq!(capfirst("social media settings"), "Social media settings");
    }

    #[test]
    fn test_register_application() {
        let mut builder = SchemaBuilder::default();
        builder
            .register_application(&catalog(), "test_app_1", "{app}", &[])
            .unwrap();
        let registry = builder.registry();

        let page = registry.page(&ModelId::new("test_app_1", "TestPage")).unwrap();
        assert_eq!(page.name, "Test_app_1TestPage");
        assert_eq!(page.interfaces, [super::super::PAGE_INTERFACE]);
        // `title` is a page interface field.
        let names = page.fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["subtitle", "author", "body", "extraBody"]);
        let FieldPlan::Stream(body) = &page.field("body").unwrap().plan else {
            panic!("expected a stream field");
        };
        assert_eq!(body.name, "Test_app_1TestPageBodyType");
        assert_eq!(
            body.members,
            ["CharBlock", "DecimalBlock", "Test_app_1Quote"]
        );
        let FieldPlan::Reference(author) = &page.field("author").unwrap().plan else {
            panic!("expected a reference");
        };
        assert_eq!(author.type_name, "Test_app_1Author");

        // The struct block shared by both stream fields is built once.
        let FieldPlan::Stream(extra) = &page.field("extraBody").unwrap().plan else {
            panic!("expected a stream field");
        };
        let (Handler::Object(a), Handler::Object(b)) =
            (&body.blocks["quote"].handler, &extra.blocks["quote"].handler)
        else {
            panic!("expected struct handlers");
        };
        assert!(Arc::ptr_eq(a, b));

        let form = registry.form("Test_app_1ContactPage").unwrap();
        assert_eq!(form.mutation, "testApp1ContactPage");
        assert_eq!(form.result.name, "Test_app_1ContactPageMutation");
        assert!(form.page.field("formFields").is_some());

        let setting = registry.setting("Social media settings").unwrap();
        assert_eq!(setting.ty.name, "Test_app_1SocialMediaSettings");
        assert!(registry.django().contains_key("Test_app_1Advert"));

        for model in ["testpage", "contactpage", "socialmediasettings"] {
            assert!(registry.page_prefetch_fields().contains(model), "{model}");
        }
        assert!(!registry.page_prefetch_fields().contains("advert"));
        assert_eq!(
            registry.classification(&ModelId::new("test_app_1", "Author")),
            Some(Classification::Snippet)
        );
    }

    #[test]
    fn test_register_twice() {
        let mut builder = SchemaBuilder::default();
        builder
            .register_application(&catalog(), "test_app_1", "{app}", &[])
            .unwrap();
        let once: BTreeMap<RegistryKey, String> = builder.registry().models();
        builder
            .register_application(&catalog(), "test_app_1", "{app}", &[])
            .unwrap();
        assert_eq!(builder.registry().models(), once);
    }

    #[test]
    fn test_exclude() {
        let mut builder = SchemaBuilder::default();
        let advert = ModelId::new("test_app_1", "Advert");
        builder
            .register_application(&catalog(), "test_app_1", "", &[advert.clone()])
            .unwrap();
        assert!(!builder.registry().is_registered(&advert));
        assert!(builder.registry().page(&ModelId::new("test_app_1", "TestPage")).is_ok());
        assert!(builder.registry().snippet_by_name("Author").is_ok());
    }

    #[test]
    fn test_snippet_from_unregistered_app() {
        let catalog = Catalog::default()
            .with_model(
                ModelDescriptor::page("blog", "BlogPage")
                    .with_reference("author", Chooser::Snippet(ModelId::new("people", "Author"))),
            )
            .with_snippet(ModelDescriptor::model("people", "Author"));
        let mut builder = SchemaBuilder::default();
        let err = builder
            .register_application(&catalog, "blog", "{app}", &[])
            .unwrap_err();
        assert!(matches!(err, Error::UnregisteredSnippet { .. }), "{err}");

        // Registering the snippet's application first fixes it.
        let mut builder = SchemaBuilder::new(ApiSettings {
            prefix: Prefix::All(String::new()),
            ..ApiSettings::default().with_apps(["people", "blog"])
        });
        builder.register_applications(&catalog).unwrap();
        assert_eq!(builder.registry().snippets()[&ModelId::new("people", "Author")], "Author");
    }

    #[test]
    fn test_name_collision_between_apps() {
        let catalog = Catalog::default()
            .with_model(ModelDescriptor::page("a", "HomePage"))
            .with_model(ModelDescriptor::page("b", "HomePage"));
        let mut builder = SchemaBuilder::default();
        builder.register_application(&catalog, "a", "", &[]).unwrap();
        let err = builder.register_application(&catalog, "b", "", &[]).unwrap_err();
        assert!(matches!(err, Error::NameCollision { .. }), "{err}");
    }
}
