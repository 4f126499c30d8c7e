//! Interfaces provided by the host's data layer.
//!
//! The entrypoint is [`DataSource`], through which every resolver in the generated schema loads
//! content. Queries for pages and media are described declaratively by [`PageQuery`] and
//! [`CollectionQuery`], sets of filters which a data source must apply conjunctively. Keeping the
//! filters as data rather than closures lets the [permission layer](crate::permissions) narrow a
//! query without knowing how the host will execute it.

use crate::catalog::ModelId;
use crate::content::{
    Document, FlatMenu, Id, Image, Instance, Menu, Page, Site, User,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::error::Error;

pub mod mock;

/// A source of content which can be served by the generated schema.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Errors reported while attempting to load data.
    type Error: Error + Send + Sync + 'static;

    /// Load the pages matching `query`.
    ///
    /// Pages are returned with their specific content loaded. If `query.order_by_path` is set, the
    /// pages must be ordered by tree path.
    async fn pages(&self, query: &PageQuery) -> Result<Vec<Page>, Self::Error>;

    /// Load a revision of `page`.
    ///
    /// The returned page reflects the content of the revision and has its `revision` field set.
    async fn page_revision(
        &self,
        page: &Page,
        revision: Revision,
    ) -> Result<Option<Page>, Self::Error>;

    /// All view restrictions placed on pages.
    async fn page_view_restrictions(&self) -> Result<Vec<PageViewRestriction>, Self::Error>;

    async fn images(&self, query: &CollectionQuery) -> Result<Vec<Image>, Self::Error>;

    async fn documents(&self, query: &CollectionQuery) -> Result<Vec<Document>, Self::Error>;

    /// All view restrictions placed on collections.
    async fn collection_view_restrictions(
        &self,
    ) -> Result<Vec<CollectionViewRestriction>, Self::Error>;

    /// Load instances of a snippet model.
    ///
    /// If `ids` is given, only those instances are returned, in no particular order; otherwise all
    /// instances are returned.
    async fn snippets(
        &self,
        model: &ModelId,
        ids: Option<&[Id]>,
    ) -> Result<Vec<Instance>, Self::Error>;

    /// Load the settings object of type `model` for `site`.
    async fn setting(
        &self,
        model: &ModelId,
        site: Option<&Site>,
    ) -> Result<Option<Instance>, Self::Error>;

    async fn main_menus(&self) -> Result<Vec<Menu>, Self::Error>;

    /// Load secondary menus, optionally only the one with the given handle.
    async fn flat_menus(&self, handle: Option<&str>) -> Result<Vec<FlatMenu>, Self::Error>;

    /// Store a validated form submission.
    async fn process_form_submission(
        &self,
        page: &Page,
        values: &Map<String, Value>,
        user: Option<&User>,
    ) -> Result<(), Self::Error>;

    /// The URL at which a rendition of `image` is served on demand.
    fn image_url(&self, image: &Image, filter_spec: &str) -> String;

    /// The URL of a pre-generated rendition of `image`, creating it if necessary.
    async fn rendition_url(&self, image: &Image, filter_spec: &str) -> Result<String, Self::Error>;
}

/// Which revision of a page to load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Revision {
    Latest,
    Id(Id),
}

impl From<i64> for Revision {
    /// Interpret a revision argument, where `-1` means the latest revision.
    fn from(id: i64) -> Self {
        if id == -1 {
            Self::Latest
        } else {
            Self::Id(id)
        }
    }
}

/// The kind of a view restriction.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RestrictionKind {
    /// Visible only after entering a shared password.
    Password,
    /// Visible only to logged-in users.
    Login,
    /// Visible only to members of one of the groups.
    Groups(BTreeSet<String>),
}

/// A restriction on viewing a page and its descendants.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageViewRestriction {
    /// The tree path of the restricted page.
    pub page_path: String,
    pub kind: RestrictionKind,
}

/// A restriction on viewing the items in a collection.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionViewRestriction {
    pub collection: Id,
    pub kind: RestrictionKind,
}

/// A condition on pages.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PageFilter {
    Id(Id),
    Ids(BTreeSet<Id>),
    UrlPath(String),
    /// Direct children of the page with the given tree path.
    ChildOf(String),
    /// Pages in the subtree rooted at the given tree path.
    DescendantOf { path: String, inclusive: bool },
    /// Pages outside the subtree rooted at the given tree path.
    NotDescendantOf { path: String, inclusive: bool },
    /// Pages with no view restriction on themselves or an ancestor.
    Public,
    Live,
    InMenus,
    /// Matches nothing.
    Nothing,
}

impl PageFilter {
    /// Does `page` satisfy this filter, given the view restrictions in force?
    pub fn matches(&self, page: &Page, restrictions: &[PageViewRestriction]) -> bool {
        match self {
            Self::Id(id) => page.id == *id,
            Self::Ids(ids) => ids.contains(&page.id),
            Self::UrlPath(url_path) => &page.url_path == url_path,
            Self::ChildOf(path) => page.is_child_of(path),
            Self::DescendantOf { path, inclusive } => page.is_descendant_of(path, *inclusive),
            Self::NotDescendantOf { path, inclusive } => !page.is_descendant_of(path, *inclusive),
            Self::Public => !restrictions
                .iter()
                .any(|r| page.is_descendant_of(&r.page_path, true)),
            Self::Live => page.live,
            Self::InMenus => page.show_in_menus,
            Self::Nothing => false,
        }
    }
}

/// A query for pages: the conjunction of a set of filters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageQuery {
    pub filters: BTreeSet<PageFilter>,
    pub order_by_path: bool,
    /// Relations the data source may load eagerly, since the client has asked for them.
    pub select_related: BTreeSet<String>,
}

impl PageQuery {
    /// A query matching all pages.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: PageFilter) -> Self {
        self.filters.insert(filter);
        self
    }

    pub fn id(self, id: Id) -> Self {
        self.filter(PageFilter::Id(id))
    }

    pub fn ids(self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.filter(PageFilter::Ids(ids.into_iter().collect()))
    }

    pub fn url_path(self, url_path: impl Into<String>) -> Self {
        self.filter(PageFilter::UrlPath(url_path.into()))
    }

    pub fn child_of(self, parent: &Page) -> Self {
        self.filter(PageFilter::ChildOf(parent.path.clone()))
    }

    pub fn live(self) -> Self {
        self.filter(PageFilter::Live)
    }

    pub fn in_menus(self) -> Self {
        self.filter(PageFilter::InMenus)
    }

    pub fn none(self) -> Self {
        self.filter(PageFilter::Nothing)
    }

    pub fn order_by_path(mut self) -> Self {
        self.order_by_path = true;
        self
    }

    pub fn select_related(mut self, relations: impl IntoIterator<Item = String>) -> Self {
        self.select_related.extend(relations);
        self
    }

    /// Does `page` satisfy every filter in this query?
    pub fn matches(&self, page: &Page, restrictions: &[PageViewRestriction]) -> bool {
        self.filters.iter().all(|f| f.matches(page, restrictions))
    }
}

/// A condition on images or documents.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollectionFilter {
    Id(Id),
    Ids(BTreeSet<Id>),
    /// Items in collections with no view restriction.
    Public,
    NotInCollection(Id),
    Nothing,
}

impl CollectionFilter {
    /// Does an item in `collection` with ID `id` satisfy this filter?
    pub fn matches(&self, id: Id, collection: Id, restrictions: &[CollectionViewRestriction]) -> bool {
        match self {
            Self::Id(expected) => id == *expected,
            Self::Ids(ids) => ids.contains(&id),
            Self::Public => !restrictions.iter().any(|r| r.collection == collection),
            Self::NotInCollection(excluded) => collection != *excluded,
            Self::Nothing => false,
        }
    }
}

/// A query for items in collections: the conjunction of a set of filters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionQuery {
    pub filters: BTreeSet<CollectionFilter>,
}

impl CollectionQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: CollectionFilter) -> Self {
        self.filters.insert(filter);
        self
    }

    pub fn id(self, id: Id) -> Self {
        self.filter(CollectionFilter::Id(id))
    }

    pub fn ids(self, ids: impl IntoIterator<Item = Id>) -> Self {
        self.filter(CollectionFilter::Ids(ids.into_iter().collect()))
    }

    pub fn matches(
        &self,
        id: Id,
        collection: Id,
        restrictions: &[CollectionViewRestriction],
    ) -> bool {
        self.filters
            .iter()
            .all(|f| f.matches(id, collection, restrictions))
    }
}

/// Per-request state made available to resolvers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// The logged-in user, or [`None`] for anonymous requests.
    pub user: Option<User>,
    /// The site the request was made to, or [`None`] if no site matches.
    pub site: Option<Site>,
}

impl RequestContext {
    pub fn anonymous(site: Site) -> Self {
        Self {
            user: None,
            site: Some(site),
        }
    }

    pub fn user(user: User, site: Site) -> Self {
        Self {
            user: Some(user),
            site: Some(site),
        }
    }

    pub fn is_superuser(&self) -> bool {
        self.user.as_ref().map(|u| u.is_superuser).unwrap_or(false)
    }
}
