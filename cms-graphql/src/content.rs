//! Runtime content served by the API.
//!
//! These are the rows a [`DataSource`](crate::backend::DataSource) hands back to the resolvers:
//! model instances, pages, images, documents, menus, sites and users. Model-specific attributes are
//! kept as JSON so that one set of types can represent instances of any model in the catalog.

use crate::catalog::ModelId;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use strum::{Display, EnumString};

/// The primary key of a row.
pub type Id = i64;

/// An instance of some model in the catalog.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Instance {
    pub id: Id,
    pub model: ModelId,
    /// Attribute values, keyed by field name.
    #[serde(default)]
    pub values: Map<String, Value>,
    /// Stream field values, keyed by field name.
    #[serde(default)]
    pub streams: BTreeMap<String, StreamValue>,
}

impl Instance {
    pub fn new(id: Id, model: ModelId) -> Self {
        Self {
            id,
            model,
            values: Default::default(),
            streams: Default::default(),
        }
    }

    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn with_stream(mut self, field: impl Into<String>, stream: StreamValue) -> Self {
        self.streams.insert(field.into(), stream);
        self
    }

    /// The value of an attribute, or `null` if it is not set.
    pub fn value(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&Value::Null)
    }
}

/// The stored value of a stream field.
///
/// The host stores stream data either lazily, as a list of `{"type", "value", "id"}` objects which
/// have not yet been decoded, or eagerly, as a list of `[type, value, id]` tuples. Both forms are
/// accepted; `is_lazy` says which one `stream_data` holds.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct StreamValue {
    pub is_lazy: bool,
    pub stream_data: Vec<Value>,
}

/// One block decoded from a stream field.
#[derive(Clone, Debug, PartialEq)]
pub struct RawBlock {
    pub block_type: String,
    pub value: Value,
    pub id: Option<String>,
}

impl StreamValue {
    /// A stream in the lazy representation.
    pub fn lazy(blocks: impl IntoIterator<Item = Value>) -> Self {
        Self {
            is_lazy: true,
            stream_data: blocks.into_iter().collect(),
        }
    }

    /// A stream in the decoded tuple representation.
    pub fn eager(blocks: impl IntoIterator<Item = Value>) -> Self {
        Self {
            is_lazy: false,
            stream_data: blocks.into_iter().collect(),
        }
    }

    /// Split each stored block into its type, value and ID.
    ///
    /// `field` is only used for error messages.
    pub fn blocks(&self, field: &str) -> Result<Vec<RawBlock>> {
        self.stream_data
            .iter()
            .map(|block| {
                if self.is_lazy {
                    Self::decode_lazy(field, block)
                } else {
                    Self::decode_eager(field, block)
                }
            })
            .collect()
    }

    fn decode_lazy(field: &str, block: &Value) -> Result<RawBlock> {
        let Value::Object(block) = block else {
            return Err(Error::malformed(field, format!("expected an object, got {block}")));
        };
        let block_type = block
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::malformed(field, "block has no type"))?;
        Ok(RawBlock {
            block_type: block_type.into(),
            value: block.get("value").cloned().unwrap_or(Value::Null),
            id: block.get("id").and_then(Value::as_str).map(String::from),
        })
    }

    fn decode_eager(field: &str, block: &Value) -> Result<RawBlock> {
        let Some(parts) = block.as_array().filter(|parts| parts.len() >= 2) else {
            return Err(Error::malformed(
                field,
                format!("expected a (type, value, id) tuple, got {block}"),
            ));
        };
        let block_type = parts[0]
            .as_str()
            .ok_or_else(|| Error::malformed(field, "block type is not a string"))?;
        Ok(RawBlock {
            block_type: block_type.into(),
            value: parts[1].clone(),
            id: parts.get(2).and_then(Value::as_str).map(String::from),
        })
    }
}

/// The kind of input in a form page.
#[derive(
    Clone, Copy, Debug, Display, EnumString, PartialEq, Eq, Hash, Deserialize, Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FormFieldType {
    SingleLine,
    MultiLine,
    Email,
    Number,
    Url,
    Checkbox,
    Checkboxes,
    Dropdown,
    MultiSelect,
    Radio,
    Date,
    DateTime,
    Hidden,
}

/// A field of a form page.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FormField {
    pub label: String,
    pub field_type: FormFieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub default_value: String,
    #[serde(default)]
    pub help_text: String,
}

impl FormField {
    pub fn new(label: impl Into<String>, field_type: FormFieldType) -> Self {
        Self {
            label: label.into(),
            field_type,
            required: false,
            choices: vec![],
            default_value: String::new(),
            help_text: String::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_choices<I>(mut self, choices: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    /// The key under which submitted values for this field are expected.
    pub fn clean_name(&self) -> String {
        self.label.to_case(Case::Kebab)
    }
}

/// A page in the page tree.
///
/// The tree position is encoded in `path`, a string of fixed-width steps (four characters each),
/// so that `a` is an ancestor of `b` exactly when `b.path` starts with `a.path`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Page {
    pub id: Id,
    pub title: String,
    pub slug: String,
    pub url_path: String,
    pub path: String,
    pub depth: i32,
    pub numchild: i32,
    pub seo_title: String,
    pub live: bool,
    pub show_in_menus: bool,
    pub expired: bool,
    pub locked: bool,
    pub draft_title: String,
    pub has_unpublished_changes: bool,
    pub first_published_at: Option<DateTime<Utc>>,
    pub last_published_at: Option<DateTime<Utc>>,
    pub latest_revision_created_at: Option<DateTime<Utc>>,
    pub go_live_at: Option<DateTime<Utc>>,
    pub expire_at: Option<DateTime<Utc>>,
    /// The revision this page was loaded from, if it was not loaded from the live version.
    pub revision: Option<Id>,
    /// The model-specific content of the page.
    pub content: Instance,
    #[serde(default)]
    pub form_fields: Vec<FormField>,
}

/// The width of one step in a page path.
pub const PATH_STEP: usize = 4;

impl Page {
    /// A live page with the given tree path.
    ///
    /// The slug is derived from the title and the URL path is left at `/`; use
    /// [`with_url_path`](Self::with_url_path) to place the page in the URL hierarchy.
    pub fn new(id: Id, model: ModelId, path: impl Into<String>, title: impl Into<String>) -> Self {
        let path = path.into();
        let title = title.into();
        Self {
            id,
            slug: title.to_case(Case::Kebab),
            url_path: "/".into(),
            depth: (path.len() / PATH_STEP) as i32,
            path,
            numchild: 0,
            seo_title: String::new(),
            live: true,
            show_in_menus: false,
            expired: false,
            locked: false,
            draft_title: title.clone(),
            has_unpublished_changes: false,
            first_published_at: None,
            last_published_at: None,
            latest_revision_created_at: None,
            go_live_at: None,
            expire_at: None,
            revision: None,
            content: Instance::new(id, model),
            form_fields: vec![],
            title,
        }
    }

    pub fn with_url_path(mut self, url_path: impl Into<String>) -> Self {
        self.url_path = url_path.into();
        self
    }

    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content = self.content.with_value(field, value);
        self
    }

    pub fn with_stream(mut self, field: impl Into<String>, stream: StreamValue) -> Self {
        self.content = self.content.with_stream(field, stream);
        self
    }

    pub fn with_form_field(mut self, field: FormField) -> Self {
        self.form_fields.push(field);
        self
    }

    pub fn in_menus(mut self) -> Self {
        self.show_in_menus = true;
        self
    }

    pub fn draft(mut self) -> Self {
        self.live = false;
        self
    }

    pub fn model(&self) -> &ModelId {
        &self.content.model
    }

    /// Is this page in the subtree rooted at the page with path `ancestor`?
    pub fn is_descendant_of(&self, ancestor: &str, inclusive: bool) -> bool {
        self.path.starts_with(ancestor) && (inclusive || self.path.len() > ancestor.len())
    }

    /// Is this page a direct child of the page with path `parent`?
    pub fn is_child_of(&self, parent: &str) -> bool {
        self.path.starts_with(parent) && self.path.len() == parent.len() + PATH_STEP
    }
}

/// A rectangle in image coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// The rectangle of the given size centered on `(x, y)`.
    pub fn from_point(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            left: x - width / 2,
            top: y - height / 2,
            right: x + width / 2,
            bottom: y + height / 2,
        }
    }

    pub fn x(&self) -> i32 {
        (self.left + self.right) / 2
    }

    pub fn y(&self) -> i32 {
        (self.top + self.bottom) / 2
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// An image in the media library.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Image {
    pub id: Id,
    pub title: String,
    pub file: String,
    pub width: i32,
    pub height: i32,
    pub collection: Id,
    #[serde(default)]
    pub focal_point: Option<Rect>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Image {
    pub fn new(id: Id, title: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            file: file.into(),
            width: 0,
            height: 0,
            collection: 1,
            focal_point: None,
            tags: vec![],
            created_at: None,
        }
    }

    /// The rendition served when a client does not ask for one.
    pub fn default_rendition(&self) -> String {
        match &self.focal_point {
            Some(fp) => format!("fill-{}x{}-c100", fp.width(), fp.height()),
            None => "original".into(),
        }
    }
}

/// A document in the media library.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Document {
    pub id: Id,
    pub title: String,
    pub file: String,
    pub collection: Id,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn new(id: Id, title: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            file: file.into(),
            collection: 1,
            tags: vec![],
            created_at: None,
        }
    }

    pub fn filename(&self) -> &str {
        self.file.rsplit('/').next().unwrap_or(&self.file)
    }

    pub fn file_extension(&self) -> &str {
        self.filename()
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .unwrap_or_default()
    }

    pub fn url(&self) -> String {
        format!("/documents/{}/{}", self.id, self.filename())
    }
}

/// A site served by the host.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Site {
    pub id: Id,
    pub hostname: String,
    pub port: i32,
    pub site_name: String,
    pub root_page: Id,
    /// The tree path of the root page.
    pub root_path: String,
    pub is_default_site: bool,
}

impl Site {
    pub fn new(id: Id, hostname: impl Into<String>, root_page: Id, root_path: impl Into<String>) -> Self {
        Self {
            id,
            hostname: hostname.into(),
            port: 80,
            site_name: String::new(),
            root_page,
            root_path: root_path.into(),
            is_default_site: true,
        }
    }
}

/// An authenticated user.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub is_active: bool,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl User {
    pub fn new(id: Id, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            is_active: true,
            ..Default::default()
        }
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self.is_staff = true;
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.groups.insert(group.into());
        self
    }

    /// The placeholder returned for requests without a logged-in user.
    pub fn anonymous() -> Self {
        Self {
            id: -1,
            username: "anonymous".into(),
            ..Default::default()
        }
    }
}

/// An entry in a menu.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MenuItem {
    pub link_page: Option<Id>,
    pub link_url: Option<String>,
    pub link_text: String,
    pub url_append: String,
    pub allow_subnav: bool,
    pub sort_order: i32,
}

/// The main navigation menu of a site.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Menu {
    pub site: Id,
    pub max_levels: i32,
    pub menu_items: Vec<MenuItem>,
}

/// A secondary menu, identified by a handle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FlatMenu {
    pub site: Id,
    pub title: String,
    pub handle: String,
    pub heading: String,
    pub max_levels: i32,
    pub menu_items: Vec<MenuItem>,
}
