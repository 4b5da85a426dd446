use std::ops::Deref;
use std::sync::Arc;

use canopy_core::{Component, Dispatcher, DispatcherConfig, MemoryDocument, NativeHandle, Ui};

/// Dispatcher over an in-memory document with helpers to drive it from a
/// test.
///
/// Both testers mount the given UI and consume the resulting work before
/// they are handed out, so assertions can run right away.
pub struct Harness {
    dispatcher: Dispatcher,
    document: Arc<MemoryDocument>,
}

impl Harness {
    fn start(config: DispatcherConfig, ui: Ui) -> Self {
        let document = Arc::new(MemoryDocument::new());
        let dispatcher = config.with_document(document.clone()).build();
        dispatcher.mount(ui);
        dispatcher.consume();
        Self {
            dispatcher,
            document,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn document(&self) -> &MemoryDocument {
        &self.document
    }

    /// Native handle of the body the UI is mounted in.
    pub fn body(&self) -> Option<NativeHandle> {
        self.dispatcher.body_handle()
    }

    /// Markup of the body, including the `<body>` tag.
    pub fn markup(&self) -> String {
        self.body()
            .map(|body| self.document.markup(body))
            .unwrap_or_default()
    }

    /// Markup of the mounted root alone.
    pub fn root_markup(&self) -> String {
        self.body()
            .and_then(|body| self.document.children(body).first().copied())
            .map(|root| self.document.markup(root))
            .unwrap_or_default()
    }

    /// Runs `f` against the first mounted component of type `C`.
    pub fn with_component<C: Component, R>(&self, f: impl FnOnce(&C) -> R) -> Option<R> {
        self.dispatcher.inspect(f)
    }

    /// Replaces the mounted UI and consumes the resulting work.
    pub fn remount(&self, ui: Ui) {
        self.dispatcher.mount(ui);
        self.dispatcher.consume();
    }

    /// Navigates to `path` and consumes the resulting work.
    pub fn navigate(&self, path: &str) {
        self.dispatcher.navigate(path);
        self.dispatcher.consume();
    }

    pub fn consume(&self) {
        self.dispatcher.consume();
    }

    pub fn consume_next(&self) -> bool {
        self.dispatcher.consume_next()
    }

    /// Consumes the remaining work and releases the mounted tree.
    pub fn close(&self) {
        self.dispatcher.close();
    }
}

/// Tester emulating a browser client.
pub struct ClientTester {
    harness: Harness,
}

impl ClientTester {
    pub fn new(ui: Ui) -> Self {
        Self::with_config(Dispatcher::builder(), ui)
    }

    /// Builds the dispatcher from `config`. Its document is replaced by the
    /// tester's own.
    pub fn with_config(config: DispatcherConfig, ui: Ui) -> Self {
        Self {
            harness: Harness::start(config.runs_in_server(false), ui),
        }
    }
}

impl Deref for ClientTester {
    type Target = Harness;

    fn deref(&self) -> &Harness {
        &self.harness
    }
}

/// Tester emulating server-side pre-rendering.
pub struct ServerTester {
    harness: Harness,
}

impl ServerTester {
    pub fn new(ui: Ui) -> Self {
        Self::with_config(Dispatcher::builder(), ui)
    }

    pub fn with_config(config: DispatcherConfig, ui: Ui) -> Self {
        Self {
            harness: Harness::start(config.runs_in_server(true), ui),
        }
    }

    /// Calls `on_pre_render` on every component and waits for the work it
    /// starts.
    pub fn pre_render(&self) {
        self.harness.dispatcher.pre_render();
        self.harness.dispatcher.consume();
    }
}

impl Deref for ServerTester {
    type Target = Harness;

    fn deref(&self) -> &Harness {
        &self.harness
    }
}

/// Runs `f` with a [`ClientTester`] mounting `ui`, closing it afterwards.
pub fn run_client_test<R>(ui: Ui, f: impl FnOnce(&ClientTester) -> R) -> R {
    let tester = ClientTester::new(ui);
    let result = f(&tester);
    tester.close();
    result
}

#[cfg(test)]
mod tests {
    use canopy_core::{component, elem, text, Context};

    use super::*;

    #[derive(Default)]
    struct Page {
        title: String,
        server: bool,
    }

    impl Component for Page {
        fn render(&self) -> Ui {
            elem("main")
                .attr("data-server", self.server)
                .text(&self.title)
                .into()
        }

        fn on_mount(&mut self, ctx: &mut Context<'_>) {
            self.server = ctx.dispatcher().runs_in_server();
        }

        fn on_pre_render(&mut self, ctx: &mut Context<'_>) {
            self.title = "pre-rendered".into();
            ctx.dispatch(|_| {});
        }
    }

    #[test]
    fn client_tester_mounts_and_consumes() {
        let tester = ClientTester::new(component(Page {
            title: "hello".into(),
            server: false,
        }));

        assert!(!tester.dispatcher().runs_in_server());
        assert!(tester.dispatcher().is_idle());
        assert_eq!(
            tester.root_markup(),
            r#"<main data-server="false">hello</main>"#
        );
        assert_eq!(
            tester.with_component(|page: &Page| page.title.clone()),
            Some("hello".to_owned())
        );
        tester.close();
    }

    #[test]
    fn server_tester_runs_pre_render_hooks() {
        let tester = ServerTester::new(component(Page::default()));
        assert_eq!(tester.root_markup(), r#"<main data-server="true"></main>"#);

        tester.pre_render();

        assert_eq!(
            tester.root_markup(),
            r#"<main data-server="true">pre-rendered</main>"#
        );
        tester.close();
    }

    #[test]
    fn remount_patches_the_body() {
        run_client_test(text("first"), |tester| {
            assert_eq!(tester.markup(), "<body>first</body>");
            tester.remount(text("second"));
            assert_eq!(tester.markup(), "<body>second</body>");
        });
    }
}
