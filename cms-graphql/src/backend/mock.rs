//! Mock instantiation of the [`DataSource`](super::DataSource) interface.
//!
//! This instantiation keeps all content in memory. It is useful for testing the generated schema
//! in isolation from a real CMS. It also counts the calls made to it, so tests can check that
//! resolvers batch their lookups.
#![cfg(any(test, feature = "mocks"))]

use super::{
    CollectionQuery, CollectionViewRestriction, DataSource, PageQuery, PageViewRestriction,
    Revision,
};
use crate::catalog::ModelId;
use crate::content::{
    Document, FlatMenu, Id, Image, Instance, Menu, Page, Site, User,
};
use async_std::sync::{Arc, RwLock};
use async_trait::async_trait;
use derive_more::From;
use itertools::Itertools;
use serde_json::{Map, Value};
use snafu::Snafu;
use std::collections::{BTreeMap, HashMap};

/// Errors returned by the in-memory data source.
#[derive(Debug, Snafu, From)]
#[snafu(display("mock data source error: {}", message))]
pub struct Error {
    message: String,
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}

/// A stored form submission.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    pub page: Id,
    pub values: Map<String, Value>,
    pub user: Option<Id>,
}

/// The in-memory store.
#[derive(Debug, Default)]
struct Db {
    pages: Vec<Page>,
    revisions: HashMap<Id, Vec<Page>>,
    page_restrictions: Vec<PageViewRestriction>,
    images: Vec<Image>,
    documents: Vec<Document>,
    collection_restrictions: Vec<CollectionViewRestriction>,
    snippets: BTreeMap<ModelId, Vec<Instance>>,
    settings: Vec<(Option<Id>, Instance)>,
    main_menus: Vec<Menu>,
    flat_menus: Vec<FlatMenu>,
    submissions: Vec<Submission>,
    calls: HashMap<&'static str, usize>,
}

impl Db {
    fn record(&mut self, call: &'static str) {
        *self.calls.entry(call).or_default() += 1;
    }
}

/// A handle to an in-memory data source.
///
/// Handles can be [cloned](Clone) to share the same underlying store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDataSource(Arc<RwLock<Db>>);

impl InMemoryDataSource {
    /// Create a new, empty data source.
    pub fn create() -> Self {
        Self::default()
    }

    pub async fn insert_page(&self, page: Page) {
        let mut db = self.0.write().await;
        // Keep `numchild` consistent for the parent.
        let parent_path = &page.path[..page.path.len().saturating_sub(crate::content::PATH_STEP)];
        if let Some(parent) = db.pages.iter_mut().find(|p| p.path == parent_path) {
            parent.numchild += 1;
        }
        db.pages.push(page);
    }

    /// Save a revision of a page.
    ///
    /// Revisions are kept in insertion order, so the last revision inserted for a page is its
    /// latest revision.
    pub async fn insert_revision(&self, page: Id, revision: Id, mut content: Page) {
        content.revision = Some(revision);
        self.0
            .write()
            .await
            .revisions
            .entry(page)
            .or_default()
            .push(content);
    }

    pub async fn restrict_page(&self, restriction: PageViewRestriction) {
        self.0.write().await.page_restrictions.push(restriction);
    }

    pub async fn insert_image(&self, image: Image) {
        self.0.write().await.images.push(image);
    }

    pub async fn insert_document(&self, document: Document) {
        self.0.write().await.documents.push(document);
    }

    pub async fn restrict_collection(&self, restriction: CollectionViewRestriction) {
        self.0.write().await.collection_restrictions.push(restriction);
    }

    pub async fn insert_snippet(&self, snippet: Instance) {
        self.0
            .write()
            .await
            .snippets
            .entry(snippet.model.clone())
            .or_default()
            .push(snippet);
    }

    /// Delete a snippet, leaving any references to it dangling.
    pub async fn delete_snippet(&self, model: &ModelId, id: Id) {
        if let Some(rows) = self.0.write().await.snippets.get_mut(model) {
            rows.retain(|row| row.id != id);
        }
    }

    /// Save a settings object, either for a specific site or as the default for all sites.
    pub async fn insert_setting(&self, setting: Instance, site: Option<Id>) {
        self.0.write().await.settings.push((site, setting));
    }

    pub async fn insert_main_menu(&self, menu: Menu) {
        self.0.write().await.main_menus.push(menu);
    }

    pub async fn insert_flat_menu(&self, menu: FlatMenu) {
        self.0.write().await.flat_menus.push(menu);
    }

    /// The form submissions received so far.
    pub async fn submissions(&self) -> Vec<Submission> {
        self.0.read().await.submissions.clone()
    }

    /// The number of times the data source method `call` has been invoked.
    pub async fn calls(&self, call: &str) -> usize {
        self.0.read().await.calls.get(call).copied().unwrap_or(0)
    }
}

#[async_trait]
impl DataSource for InMemoryDataSource {
    type Error = Error;

    async fn pages(&self, query: &PageQuery) -> Result<Vec<Page>, Self::Error> {
        let mut db = self.0.write().await;
        db.record("pages");
        tracing::info!(
            "SELECT pages WHERE {:?} (select_related {:?})",
            query.filters,
            query.select_related
        );
        let pages = db
            .pages
            .iter()
            .filter(|page| query.matches(page, &db.page_restrictions))
            .cloned();
        if query.order_by_path {
            Ok(pages.sorted_by(|a, b| a.path.cmp(&b.path)).collect())
        } else {
            Ok(pages.collect())
        }
    }

    async fn page_revision(
        &self,
        page: &Page,
        revision: Revision,
    ) -> Result<Option<Page>, Self::Error> {
        let mut db = self.0.write().await;
        db.record("page_revision");
        let Some(revisions) = db.revisions.get(&page.id) else {
            return Ok(None);
        };
        Ok(match revision {
            Revision::Latest => revisions.last().cloned(),
            Revision::Id(id) => revisions.iter().find(|p| p.revision == Some(id)).cloned(),
        })
    }

    async fn page_view_restrictions(&self) -> Result<Vec<PageViewRestriction>, Self::Error> {
        Ok(self.0.read().await.page_restrictions.clone())
    }

    async fn images(&self, query: &CollectionQuery) -> Result<Vec<Image>, Self::Error> {
        let mut db = self.0.write().await;
        db.record("images");
        tracing::info!("SELECT images WHERE {:?}", query.filters);
        Ok(db
            .images
            .iter()
            .filter(|image| query.matches(image.id, image.collection, &db.collection_restrictions))
            .cloned()
            .collect())
    }

    async fn documents(&self, query: &CollectionQuery) -> Result<Vec<Document>, Self::Error> {
        let mut db = self.0.write().await;
        db.record("documents");
        tracing::info!("SELECT documents WHERE {:?}", query.filters);
        Ok(db
            .documents
            .iter()
            .filter(|doc| query.matches(doc.id, doc.collection, &db.collection_restrictions))
            .cloned()
            .collect())
    }

    async fn collection_view_restrictions(
        &self,
    ) -> Result<Vec<CollectionViewRestriction>, Self::Error> {
        Ok(self.0.read().await.collection_restrictions.clone())
    }

    async fn snippets(
        &self,
        model: &ModelId,
        ids: Option<&[Id]>,
    ) -> Result<Vec<Instance>, Self::Error> {
        let mut db = self.0.write().await;
        db.record("snippets");
        tracing::info!("SELECT {model} WHERE id IN {ids:?}");
        let rows = db.snippets.get(model).into_iter().flatten();
        Ok(match ids {
            // Return matches in storage order, like a database would.
            Some(ids) => rows.filter(|row| ids.contains(&row.id)).cloned().collect(),
            None => rows.cloned().collect(),
        })
    }

    async fn setting(
        &self,
        model: &ModelId,
        site: Option<&Site>,
    ) -> Result<Option<Instance>, Self::Error> {
        let db = self.0.read().await;
        let site = site.map(|site| site.id);
        let candidates = db
            .settings
            .iter()
            .filter(|(_, setting)| &setting.model == model);
        // Prefer settings for the specific site over the defaults.
        Ok(candidates
            .sorted_by_key(|(setting_site, _)| setting_site.is_none())
            .find(|(setting_site, _)| setting_site.is_none() || *setting_site == site)
            .map(|(_, setting)| setting.clone()))
    }

    async fn main_menus(&self) -> Result<Vec<Menu>, Self::Error> {
        Ok(self.0.read().await.main_menus.clone())
    }

    async fn flat_menus(&self, handle: Option<&str>) -> Result<Vec<FlatMenu>, Self::Error> {
        Ok(self
            .0
            .read()
            .await
            .flat_menus
            .iter()
            .filter(|menu| handle.map(|h| menu.handle == h).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn process_form_submission(
        &self,
        page: &Page,
        values: &Map<String, Value>,
        user: Option<&User>,
    ) -> Result<(), Self::Error> {
        if page.form_fields.is_empty() {
            return Err(format!("page {} is not a form page", page.id).into());
        }
        self.0.write().await.submissions.push(Submission {
            page: page.id,
            values: values.clone(),
            user: user.map(|u| u.id),
        });
        Ok(())
    }

    fn image_url(&self, image: &Image, filter_spec: &str) -> String {
        format!("/images/{}/{}/{}/", image.id, filter_spec, image.file.rsplit('/').next().unwrap_or_default())
    }

    async fn rendition_url(&self, image: &Image, filter_spec: &str) -> Result<String, Self::Error> {
        let (stem, ext) = image
            .file
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .ok_or_else(|| Error::from(format!("image {} has no file extension", image.id)))?;
        Ok(format!(
            "/media/images/{stem}.{}.{ext}",
            filter_spec.replace(['-', ':'], ".")
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::PageFilter;

    #[async_std::test]
    async fn test_pages_ordered_by_path() {
        let db = InMemoryDataSource::create();
        let model = ModelId::new("blog", "BlogPage");
        db.insert_page(Page::new(1, model.clone(), "0001", "Root")).await;
        db.insert_page(Page::new(3, model.clone(), "00010002", "Second")).await;
        db.insert_page(Page::new(2, model.clone(), "00010001", "First")).await;

        let ids = db
            .pages(&PageQuery::all().filter(PageFilter::ChildOf("0001".into())).order_by_path())
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, [2, 3]);

        let root = db.pages(&PageQuery::all().id(1)).await.unwrap();
        assert_eq!(root[0].numchild, 2);
        assert_eq!(db.calls("pages").await, 2);
    }

    #[async_std::test]
    async fn test_revisions() {
        let db = InMemoryDataSource::create();
        let model = ModelId::new("blog", "BlogPage");
        let page = Page::new(1, model.clone(), "0001", "Root");
        db.insert_page(page.clone()).await;
        db.insert_revision(1, 10, Page::new(1, model.clone(), "0001", "Old")).await;
        db.insert_revision(1, 11, Page::new(1, model, "0001", "New")).await;

        let latest = db.page_revision(&page, Revision::Latest).await.unwrap().unwrap();
        assert_eq!((latest.title.as_str(), latest.revision), ("New", Some(11)));
        let old = db.page_revision(&page, Revision::Id(10)).await.unwrap().unwrap();
        assert_eq!(old.title, "Old");
        assert_eq!(db.page_revision(&page, Revision::Id(12)).await.unwrap(), None);
    }

    #[async_std::test]
    async fn test_site_specific_settings() {
        let db = InMemoryDataSource::create();
        let model = ModelId::new("home", "SocialSettings");
        db.insert_setting(Instance::new(1, model.clone()).with_value("x", "default"), None)
            .await;
        db.insert_setting(Instance::new(2, model.clone()).with_value("x", "site"), Some(2))
            .await;

        let site = Site::new(2, "example.com", 1, "0001");
        let setting = db.setting(&model, Some(&site)).await.unwrap().unwrap();
        assert_eq!(setting.id, 2);
        let setting = db.setting(&model, None).await.unwrap().unwrap();
        assert_eq!(setting.id, 1);
    }
}
