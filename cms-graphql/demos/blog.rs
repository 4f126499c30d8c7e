use clap::Parser;
use cms_graphql::{
    backend::mock::InMemoryDataSource,
    content::{Image, Menu, MenuItem, Page, StreamValue},
    init_logging,
    prelude::*,
};
use serde_json::json;
use std::path::PathBuf;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Content models
//

/// A pull quote attributed to an author.
#[derive(StructBlock)]
#[allow(dead_code)]
#[block(class("blog.blocks.Quote"))]
pub struct Quote {
    text: TextBlock,
    /// The author of the quote.
    #[block(snippet("blog.Author"))]
    author: (),
    portrait: ImageChooserBlock,
}

pub fn catalog() -> Catalog {
    Catalog::default()
        .with_snippet(ModelDescriptor::model("blog", "Author").with_scalar("name", ScalarKind::Char))
        .with_model(
            ModelDescriptor::page("blog", "BlogPage")
                .with_scalar("intro", ScalarKind::Text)
                .with_tags("tags")
                .with_stream(
                    "body",
                    StreamBlock::default()
                        .block("heading", ScalarKind::Char)
                        .block("paragraph", ScalarKind::RichText)
                        .block("quote", Quote::describe()),
                ),
        )
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Test data
//

#[derive(Clone, Debug, Parser)]
pub struct Options {
    /// JSON file with API settings. By default, the blog application is exposed.
    #[clap(long, env = "CMS_GRAPHQL_SETTINGS")]
    settings: Option<PathBuf>,
    /// Use Relay-style global IDs and connections.
    #[clap(long, env = "CMS_GRAPHQL_RELAY")]
    relay: bool,
    /// Print the schema instead of running a query.
    #[clap(long)]
    sdl: bool,
    /// The query to run.
    #[clap(
        default_value = "{ pages { title urlPath ... on BlogBlogPage { body { __typename field } } } }"
    )]
    query: String,
}

pub fn site() -> Site {
    Site::new(1, "localhost", 2, "00010001")
}

pub async fn create_db() -> InMemoryDataSource {
    let db = InMemoryDataSource::create();
    let blog = ModelId::new("blog", "BlogPage");

    db.insert_snippet(Instance::new(1, ModelId::new("blog", "Author")).with_value("name", "Annie"))
        .await;
    db.insert_image(Image::new(1, "Portrait", "original_images/annie.jpg"))
        .await;

    db.insert_page(Page::new(2, blog.clone(), "00010001", "Home").with_url_path("/home/"))
        .await;
    db.insert_page(
        Page::new(3, blog, "000100010001", "First post")
            .with_url_path("/home/first-post/")
            .in_menus()
            .with_value("intro", "Hello, world")
            .with_value("tags", json!(["news"]))
            .with_stream(
                "body",
                StreamValue::lazy([
                    json!({"type": "heading", "value": "Welcome"}),
                    json!({"type": "paragraph", "value": "<p>It works.</p>"}),
                    json!({
                        "type": "quote",
                        "value": {"text": "Cool cool cool.", "author": 1, "portrait": 1},
                    }),
                ]),
            ),
    )
    .await;

    db.insert_main_menu(Menu {
        site: 1,
        max_levels: 1,
        menu_items: vec![MenuItem {
            link_page: Some(3),
            link_text: "Blog".into(),
            ..Default::default()
        }],
    })
    .await;

    db
}

pub async fn schema(opt: &Options) -> Result<CmsSchema<InMemoryDataSource>> {
    let settings = match &opt.settings {
        Some(path) => ApiSettings::from_json_file(path)?,
        None => ApiSettings::default().with_apps(["blog"]),
    };
    let mut builder = SchemaBuilder::new(settings.with_relay(opt.relay));
    builder.register_applications(&catalog())?;
    builder.finish(create_db().await)
}

#[async_std::main]
async fn main() -> color_eyre::Result<()> {
    init_logging();
    let opt = Options::parse();
    let schema = schema(&opt).await?;
    if opt.sdl {
        println!("{}", schema.sdl());
    } else {
        let res = schema
            .execute(opt.query.as_str(), RequestContext::anonymous(site()))
            .await;
        println!("{}", serde_json::to_string_pretty(&res)?);
    }
    Ok(())
}
