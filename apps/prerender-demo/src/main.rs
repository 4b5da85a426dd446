use std::sync::Arc;
use std::thread;
use std::time::Duration;

use canopy_app_shell::{PreRenderConfig, PreRenderer};
use canopy_cache::{PreRenderLru, PreRenderedItem};
use canopy_core::{
    component, elem, raw, text, Action, ActionRegistry, Component, Context, Dispatcher, If,
    MemoryDocument, Range, Router, StateOptions, Ui,
};
use canopy_runtime_std::{DispatchLoop, ThreadPool};

const ARTICLES: [(&str, &str); 3] = [
    ("1", "Mounting and dismounting"),
    ("2", "Actions and handlers"),
    ("3", "Observing state"),
];

#[derive(Default)]
struct Home {
    visits: u64,
}

impl Component for Home {
    fn render(&self) -> Ui {
        elem("main")
            .body([
                elem("h1").text("Canopy").into(),
                elem("ul")
                    .body([Range::slice(ARTICLES.len(), |i| {
                        let (id, title) = ARTICLES[i];
                        elem("li")
                            .body([elem("a")
                                .attr("href", format!("/articles/{id}"))
                                .text(title)
                                .into()])
                            .into()
                    })])
                    .into(),
                If::new(self.visits > 0, [text(format!("{} visits", self.visits))]).into(),
            ])
            .into()
    }

    fn on_mount(&mut self, ctx: &mut Context<'_>) {
        if let Some(observer) = ctx.observe_state("visits") {
            observer.value(|home: &mut Home, visits: u64| home.visits = visits);
        }
    }

    fn on_pre_render(&mut self, ctx: &mut Context<'_>) {
        ctx.new_action("page/viewed").tag("path", "/").post();
    }
}

#[derive(Default)]
struct Article {
    title: Option<String>,
}

impl Component for Article {
    fn render(&self) -> Ui {
        match &self.title {
            Some(title) => elem("article")
                .body([
                    elem("h1").text(title).into(),
                    raw("<p>Rendered on the server.</p>"),
                ])
                .into(),
            None => elem("article").attr("class", "loading").into(),
        }
    }

    fn on_nav(&mut self, ctx: &mut Context<'_>, path: &str) {
        let id = path.rsplit('/').next().unwrap_or_default().to_owned();
        let Some(source) = ctx.source().cloned() else {
            return;
        };
        let dispatcher = ctx.dispatcher().clone();
        ctx.run_async(move || {
            // Stands in for a database lookup.
            thread::sleep(Duration::from_millis(20));
            let title = ARTICLES
                .iter()
                .find(|(article, _)| *article == id)
                .map(|(_, title)| (*title).to_owned());
            dispatcher.update(Some(source), move |ctx| {
                if let Some(article) = ctx.component_mut::<Article>() {
                    article.title = title.or_else(|| Some("Unknown article".into()));
                }
            });
        });
    }
}

fn router() -> Arc<Router> {
    let router = Arc::new(Router::new());
    router.route_default::<Home>("/");
    if let Err(err) =
        router.route_with_regexp(r"^/articles/\d+$", || component(Article::default()))
    {
        log::error!("{err}");
    }
    router
}

fn actions() -> Arc<ActionRegistry> {
    let actions = Arc::new(ActionRegistry::new());
    actions.handle("page/viewed", |_, action| {
        log::info!("page viewed: {}", action.tags.get("path").unwrap_or("?"));
    });
    actions
}

fn pre_render(paths: &[String]) {
    let cache = PreRenderLru::with_evict_hooks(
        4096,
        Duration::from_secs(300),
        vec![Box::new(|path: &str, item: &PreRenderedItem| {
            log::info!("evicted {path} ({} bytes)", item.body.len());
        })],
    );
    let shell = PreRenderer::new(
        PreRenderConfig::new(router())
            .with_actions(actions())
            .with_cache(Arc::new(cache))
            .with_title("Canopy demo")
            .with_workers(2)
            .with_wait_timeout(Duration::from_secs(2)),
    );

    for path in paths.iter().chain(paths.iter()) {
        match shell.render(path) {
            Ok(item) => {
                println!("--- {} ({}, {} bytes)", item.path, item.content_type, item.body.len());
                println!("{}", String::from_utf8_lossy(&item.body));
            }
            Err(err) => log::error!("{err}"),
        }
    }
    println!("{} pages rendered for {} requests", shell.renders(), paths.len() * 2);
}

fn client_session() {
    let document = Arc::new(MemoryDocument::new());
    let dispatcher = Dispatcher::builder()
        .with_document(document.clone())
        .with_router(router())
        .with_spawner(Arc::new(ThreadPool::new(2)))
        .build();
    let mut dispatch_loop = match DispatchLoop::start(dispatcher.clone()) {
        Ok(dispatch_loop) => dispatch_loop,
        Err(err) => {
            log::error!("starting the dispatch loop failed: {err}");
            return;
        }
    };

    dispatcher.navigate("/");
    for visits in 1..=3u64 {
        if let Err(err) = dispatcher.set_state("visits", &visits, StateOptions::default()) {
            log::error!("{err}");
        }
    }
    dispatcher.post(Action::new("page/viewed").with_tag("path", "/"));
    thread::sleep(Duration::from_millis(50));
    dispatch_loop.stop();
    dispatcher.consume();

    println!("--- client body");
    println!("{}", document.dump_tree(dispatcher.body_handle()));
    dispatcher.close();
}

fn main() {
    env_logger::init();

    println!("=== Canopy pre-render demo ===");
    println!("Pass paths to render, e.g. `prerender-demo / /articles/2 /missing`.");
    println!();

    let mut paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        paths = vec!["/".into(), "/articles/2".into(), "/missing".into()];
    }
    pre_render(&paths);
    client_session();
}
