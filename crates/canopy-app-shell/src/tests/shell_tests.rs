use std::thread;

use canopy_core::{elem, text, Component, Context, InlineSpawner, Ui};

use super::*;

#[derive(Default)]
struct Feed {
    entries: Vec<String>,
    delay: Duration,
}

impl Component for Feed {
    fn render(&self) -> Ui {
        if self.entries.is_empty() {
            return elem("ul").attr("class", "loading").into();
        }
        elem("ul")
            .body(self.entries.iter().map(|entry| Ui::from(elem("li").text(entry))))
            .into()
    }

    fn on_pre_render(&mut self, ctx: &mut Context<'_>) {
        let Some(source) = ctx.source().cloned() else {
            return;
        };
        let dispatcher = ctx.dispatcher().clone();
        let delay = self.delay;
        ctx.run_async(move || {
            thread::sleep(delay);
            dispatcher.update(Some(source), |ctx| {
                if let Some(feed) = ctx.component_mut::<Feed>() {
                    feed.entries = vec!["first".into(), "second".into()];
                }
            });
        });
    }
}

fn router() -> Arc<Router> {
    let router = Arc::new(Router::new());
    router.route("/", || text("home"));
    router.route("/feed", || {
        canopy_core::component(Feed {
            delay: Duration::from_millis(5),
            ..Feed::default()
        })
    });
    router.route("/slow", || {
        canopy_core::component(Feed {
            delay: Duration::from_millis(300),
            ..Feed::default()
        })
    });
    router
}

fn body(item: &PreRenderedItem) -> String {
    String::from_utf8(item.body.to_vec()).unwrap()
}

#[test]
fn renders_routed_page_into_document() {
    let shell = PreRenderer::new(PreRenderConfig::new(router()).with_title("Canopy & co"));
    let item = shell.render("/").unwrap();

    assert_eq!(item.path, "/");
    assert_eq!(item.content_type, HTML_CONTENT_TYPE);
    assert_eq!(
        body(&item),
        "<!DOCTYPE html>\n<html lang=\"en\"><head><title>Canopy &amp; co</title></head><body>home</body></html>"
    );
}

#[test]
fn second_render_is_served_from_cache() {
    let cache = Arc::new(PreRenderLru::new(1 << 20, Duration::from_secs(60)));
    let shell = PreRenderer::new(PreRenderConfig::new(router()).with_cache(cache.clone()));

    let first = shell.render("/feed").unwrap();
    let second = shell.render("/feed?utm=mail").unwrap();

    assert_eq!(shell.renders(), 1);
    assert_eq!(first, second);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.size(), first.body.len());
}

#[test]
fn pre_render_waits_for_background_work() {
    let shell = PreRenderer::new(PreRenderConfig::new(router()).with_workers(2));
    let page = body(&shell.render("/feed").unwrap());

    assert!(
        page.contains("<body><ul><li>first</li><li>second</li></ul></body>"),
        "{page}"
    );
}

#[test]
fn unknown_paths_render_not_found() {
    let shell = PreRenderer::new(
        PreRenderConfig::new(router()).with_spawner(Arc::new(InlineSpawner)),
    );
    let page = body(&shell.render("/nowhere").unwrap());

    assert!(page.contains("<h1>404</h1>"), "{page}");
    assert_eq!(shell.render("").unwrap().path, "/");
}

#[test]
fn timed_out_pages_render_what_is_there() {
    let shell = PreRenderer::new(
        PreRenderConfig::new(router())
            .with_lang("fr")
            .with_wait_timeout(Duration::from_millis(20)),
    );
    let page = body(&shell.render("/slow").unwrap());

    assert!(page.contains("<html lang=\"fr\">"), "{page}");
    assert!(page.contains("<ul class=\"loading\"></ul>"), "{page}");
}

#[test]
fn trims_query_and_fragment() {
    assert_eq!(normalize("/docs?page=2#top"), "/docs");
    assert_eq!(normalize("#top"), "/");
    assert_eq!(normalize("/a/b"), "/a/b");
}
