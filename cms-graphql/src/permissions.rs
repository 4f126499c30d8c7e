//! Visibility rules for pages and media.
//!
//! The filters here are pure: they take a query and return a narrower one, leaving execution to
//! the [`DataSource`]. Since queries are sets of conjunctive filters, narrowing is idempotent and
//! narrowing with two sets of rules is the same as narrowing once with their intersection.

use crate::backend::{
    CollectionFilter, CollectionQuery, CollectionViewRestriction, DataSource, PageFilter,
    PageQuery, PageViewRestriction, RequestContext, RestrictionKind,
};
use crate::content::{Document, Image, Page, User};
use tracing::trace;

/// Does `restriction` hide content from `user`?
fn hides(restriction: &RestrictionKind, user: &User) -> bool {
    match restriction {
        RestrictionKind::Password => true,
        // Every user we know about is logged in.
        RestrictionKind::Login => false,
        RestrictionKind::Groups(groups) => groups.is_disjoint(&user.groups),
    }
}

/// Narrow `query` to the pages visible in the context of a request.
///
/// Only pages in the request's site are visible; a request with no site sees nothing. Anonymous
/// users see only public pages. Superusers see everything in the site, including drafts. Other
/// users see live pages outside the subtrees hidden from them by password and group restrictions.
pub fn filter_visible_pages(
    ctx: &RequestContext,
    restrictions: &[PageViewRestriction],
    query: PageQuery,
) -> PageQuery {
    let Some(site) = &ctx.site else {
        return query.none();
    };
    let mut query = query.filter(PageFilter::DescendantOf {
        path: site.root_path.clone(),
        inclusive: true,
    });

    match &ctx.user {
        None => query.filter(PageFilter::Public).live(),
        Some(user) if user.is_superuser => query,
        Some(user) => {
            for restriction in restrictions {
                if hides(&restriction.kind, user) {
                    query = query.filter(PageFilter::NotDescendantOf {
                        path: restriction.page_path.clone(),
                        inclusive: true,
                    });
                }
            }
            query.live()
        }
    }
}

/// Narrow `query` to the images or documents visible in the context of a request.
///
/// The rules are the same as for pages, applied to the collection containing each item.
pub fn filter_visible_collection_items(
    ctx: &RequestContext,
    restrictions: &[CollectionViewRestriction],
    query: CollectionQuery,
) -> CollectionQuery {
    match &ctx.user {
        None => query.filter(CollectionFilter::Public),
        Some(user) if user.is_superuser => query,
        Some(user) => restrictions
            .iter()
            .filter(|r| hides(&r.kind, user))
            .fold(query, |query, r| {
                query.filter(CollectionFilter::NotInCollection(r.collection))
            }),
    }
}

/// Load the pages matching `query` which are visible to the request.
pub async fn visible_pages<D: DataSource>(
    db: &D,
    ctx: &RequestContext,
    query: PageQuery,
) -> Result<Vec<Page>, D::Error> {
    let restrictions = db.page_view_restrictions().await?;
    let query = filter_visible_pages(ctx, &restrictions, query);
    trace!(?query, "loading visible pages");
    db.pages(&query).await
}

/// Load the images matching `query` which are visible to the request.
pub async fn visible_images<D: DataSource>(
    db: &D,
    ctx: &RequestContext,
    query: CollectionQuery,
) -> Result<Vec<Image>, D::Error> {
    let restrictions = db.collection_view_restrictions().await?;
    db.images(&filter_visible_collection_items(ctx, &restrictions, query))
        .await
}

/// Load the documents matching `query` which are visible to the request.
pub async fn visible_documents<D: DataSource>(
    db: &D,
    ctx: &RequestContext,
    query: CollectionQuery,
) -> Result<Vec<Document>, D::Error> {
    let restrictions = db.collection_view_restrictions().await?;
    db.documents(&filter_visible_collection_items(ctx, &restrictions, query))
        .await
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::ModelId;
    use crate::content::{Site, User};
    use proptest::{prelude::*, test_runner::Config};
    use std::collections::BTreeSet;

    /// A tree of pages under the site root `0001`, three levels deep and two wide, with a sibling
    /// tree `0002` outside the site.
    fn pages(drafts: &BTreeSet<usize>) -> Vec<Page> {
        let model = ModelId::new("test_app_1", "TestPage");
        let mut paths = vec![];
        for root in ["0001", "0002"] {
            paths.push(root.to_string());
            for a in ["0001", "0002"] {
                paths.push(format!("{root}{a}"));
                for b in ["0001", "0002"] {
                    paths.push(format!("{root}{a}{b}"));
                }
            }
        }
        paths
            .into_iter()
            .enumerate()
            .map(|(i, path)| {
                let page = Page::new(i as i64 + 1, model.clone(), path, format!("Page {i}"));
                if drafts.contains(&i) {
                    page.draft()
                } else {
                    page
                }
            })
            .collect()
    }

    fn restriction_kind() -> impl Strategy<Value = RestrictionKind> {
        prop_oneof![
            Just(RestrictionKind::Password),
            Just(RestrictionKind::Login),
            prop::collection::btree_set("editors|members|staff", 1..3).prop_map(RestrictionKind::Groups),
        ]
    }

    fn restriction() -> impl Strategy<Value = PageViewRestriction> {
        (
            prop::sample::select(vec!["0001", "00010001", "00010002", "000100020001", "0002"]),
            restriction_kind(),
        )
            .prop_map(|(path, kind)| PageViewRestriction {
                page_path: path.into(),
                kind,
            })
    }

    fn context() -> impl Strategy<Value = RequestContext> {
        let site = Site::new(1, "localhost", 1, "0001");
        let user = prop_oneof![
            Just(None),
            Just(Some(User::new(1, "admin").superuser())),
            prop::collection::btree_set("editors|members|staff", 0..3).prop_map(|groups| {
                let mut user = User::new(2, "editor");
                user.groups = groups;
                Some(user)
            }),
        ];
        user.prop_map(move |user| RequestContext {
            user,
            site: Some(site.clone()),
        })
    }

    fn visible(query: &PageQuery, pages: &[Page], restrictions: &[PageViewRestriction]) -> Vec<i64> {
        pages
            .iter()
            .filter(|p| query.matches(p, restrictions))
            .map(|p| p.id)
            .collect()
    }

    #[test]
    fn test_no_site_sees_nothing() {
        let ctx = RequestContext {
            user: Some(User::new(1, "admin").superuser()),
            site: None,
        };
        let query = filter_visible_pages(&ctx, &[], PageQuery::all());
        assert!(visible(&query, &pages(&Default::default()), &[]).is_empty());
    }

    #[test]
    fn test_site_boundary() {
        let ctx = RequestContext::user(User::new(1, "admin").superuser(), Site::new(1, "localhost", 1, "0001"));
        let pages = pages(&Default::default());
        let query = filter_visible_pages(&ctx, &[], PageQuery::all());
        let ids = visible(&query, &pages, &[]);
        assert_eq!(ids, (1..=7).collect::<Vec<_>>());
    }

    #[test]
    fn test_group_restriction() {
        let site = Site::new(1, "localhost", 1, "0001");
        let pages = pages(&Default::default());
        let restrictions = [PageViewRestriction {
            page_path: "00010001".into(),
            kind: RestrictionKind::Groups(["editors".to_string()].into()),
        }];

        let outsider = RequestContext::user(User::new(2, "bob"), site.clone());
        let query = filter_visible_pages(&outsider, &restrictions, PageQuery::all());
        assert_eq!(visible(&query, &pages, &restrictions), [1, 5, 6, 7]);

        let editor = RequestContext::user(User::new(3, "eve").in_group("editors"), site.clone());
        let query = filter_visible_pages(&editor, &restrictions, PageQuery::all());
        assert_eq!(visible(&query, &pages, &restrictions), [1, 2, 3, 4, 5, 6, 7]);

        let anonymous = RequestContext::anonymous(site);
        let query = filter_visible_pages(&anonymous, &restrictions, PageQuery::all());
        assert_eq!(visible(&query, &pages, &restrictions), [1, 5, 6, 7]);
    }

    #[test]
    fn test_collection_restrictions() {
        let site = Site::new(1, "localhost", 1, "0001");
        let restrictions = [CollectionViewRestriction {
            collection: 2,
            kind: RestrictionKind::Login,
        }];

        let anonymous = filter_visible_collection_items(
            &RequestContext::anonymous(site.clone()),
            &restrictions,
            CollectionQuery::all(),
        );
        assert!(anonymous.matches(1, 1, &restrictions));
        assert!(!anonymous.matches(2, 2, &restrictions));

        let user = filter_visible_collection_items(
            &RequestContext::user(User::new(2, "bob"), site),
            &restrictions,
            CollectionQuery::all(),
        );
        assert!(user.matches(2, 2, &restrictions));
    }

    proptest! {
        #![proptest_config(Config {
            cases: 64,
            ..Default::default()
        })]

        #[test]
        fn test_page_filter_idempotent(
            ctx in context(),
            restrictions in prop::collection::vec(restriction(), 0..4),
        ) {
            let once = filter_visible_pages(&ctx, &restrictions, PageQuery::all());
            let twice = filter_visible_pages(&ctx, &restrictions, once.clone());
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn test_page_filter_composes(
            ctx in context(),
            restrictions in prop::collection::vec(restriction(), 0..4),
            drafts in prop::collection::btree_set(0usize..14, 0..4),
            extra in prop::sample::select(vec!["0001", "00010001", "00010002"]),
        ) {
            let pages = pages(&drafts);
            let narrow = PageQuery::all().filter(PageFilter::DescendantOf {
                path: extra.into(),
                inclusive: false,
            });

            // Filtering an already narrowed query gives the intersection of the two.
            let filtered = filter_visible_pages(&ctx, &restrictions, narrow.clone());
            let visible_all = visible(
                &filter_visible_pages(&ctx, &restrictions, PageQuery::all()),
                &pages,
                &restrictions,
            );
            let expected = visible(&narrow, &pages, &restrictions)
                .into_iter()
                .filter(|id| visible_all.contains(id))
                .collect::<Vec<_>>();
            prop_assert_eq!(visible(&filtered, &pages, &restrictions), expected);
        }

        #[test]
        fn test_anonymous_sees_only_public(
            restrictions in prop::collection::vec(restriction(), 0..4),
            drafts in prop::collection::btree_set(0usize..14, 0..4),
        ) {
            let pages = pages(&drafts);
            let ctx = RequestContext::anonymous(Site::new(1, "localhost", 1, "0001"));
            let query = filter_visible_pages(&ctx, &restrictions, PageQuery::all());
            for page in pages.iter().filter(|p| query.matches(p, &restrictions)) {
                prop_assert!(page.live);
                prop_assert!(!restrictions.iter().any(|r| page.is_descendant_of(&r.page_path, true)));
            }
        }
    }
}
