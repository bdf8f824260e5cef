//! Page-side JavaScript generated by the host.
//!
//! The bootstrap script installs `window.<object>` with the page half of
//! the bridge: `invoke`, `invokeAsync`, `onMessage` and the `_receive`
//! entry point the host calls through script injection. Per-function stubs
//! (`window.<name>`) are injected separately as handlers are registered.
//!
//! Every name is embedded as a JSON string literal, so quotes or script
//! fragments in a name cannot escape the generated code.

/// How a bound function stub behaves on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    /// `window.name(args)` posts a call and returns nothing.
    FireAndForget,
    /// `window.name(args)` returns a Promise settled by the host's reply.
    Awaited,
}

const INIT_TEMPLATE: &str = r#"
(function() {
    var OBJECT = __DESKGUI_OBJECT__;
    var bridge = window[OBJECT] = window[OBJECT] || {};
    var pending = {};
    var nextId = 1;

    function toPayload(args) {
        if (args.length === 0) return null;
        if (args.length === 1) return args[0];
        return args;
    }

    bridge.postMessage = function(envelope) {
        var frame = JSON.stringify(envelope);
        if (window.ipc && window.ipc.postMessage) {
            window.ipc.postMessage(frame);
        } else if (window.webkit && window.webkit.messageHandlers) {
            window.webkit.messageHandlers.messageHandler.postMessage(frame);
        } else if (window.chrome && window.chrome.webview) {
            window.chrome.webview.postMessage(frame);
        }
    };

    bridge.invoke = function(name) {
        var args = Array.prototype.slice.call(arguments, 1);
        bridge.postMessage({ kind: 'call', name: name, payload: toPayload(args) });
    };

    bridge.invokeAsync = function(name) {
        var args = Array.prototype.slice.call(arguments, 1);
        var id = nextId++;
        return new Promise(function(resolve, reject) {
            // Registered before posting so an immediate reply finds it.
            pending[id] = { name: name, resolve: resolve, reject: reject };
            bridge.postMessage({ kind: 'call', id: id, name: name, payload: toPayload(args) });
        });
    };

    bridge.onMessage = bridge.onMessage || null;

    bridge._receive = function(frame) {
        var msg;
        try {
            msg = typeof frame === 'string' ? JSON.parse(frame) : frame;
        } catch (e) {
            console.error('deskgui: dropped malformed frame', e);
            return;
        }
        if (msg.kind === 'event') {
            if (typeof bridge.onMessage === 'function') {
                try {
                    bridge.onMessage(msg.payload, msg.name);
                } catch (e) {
                    console.error('deskgui: onMessage handler failed', e);
                }
            }
            return;
        }
        var entry = pending[msg.id];
        if (!entry) return;
        delete pending[msg.id];
        if (msg.kind === 'result') {
            entry.resolve(msg.payload);
        } else if (msg.kind === 'error') {
            var err = new Error(msg.message);
            err.code = msg.code || 'handler_failure';
            entry.reject(err);
        }
    };

    bridge._rejectAll = function(name, reason) {
        for (var id in pending) {
            if (!name || pending[id].name === name) {
                pending[id].reject(new Error(reason));
                delete pending[id];
            }
        }
    };
})();
"#;

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Bootstrap script defining `window.<object>`. Inject once per page load.
pub fn init_script(object: &str) -> String {
    INIT_TEMPLATE.replace("__DESKGUI_OBJECT__", &js_string(object))
}

/// Script defining the `window.<name>` stub for a registered function.
pub fn bind_script(object: &str, name: &str, shape: CallShape) -> String {
    let method = match shape {
        CallShape::FireAndForget => "invoke",
        CallShape::Awaited => "invokeAsync",
    };
    format!(
        "window[{name}] = function() {{ var b = window[{object}]; \
         return b.{method}.apply(b, [{name}].concat(Array.prototype.slice.call(arguments))); }};",
        name = js_string(name),
        object = js_string(object),
    )
}

/// Script removing a stub and rejecting that function's outstanding promises.
pub fn unbind_script(object: &str, name: &str) -> String {
    format!(
        "delete window[{name}]; if (window[{object}] && window[{object}]._rejectAll) {{ \
         window[{object}]._rejectAll({name}, 'function unbound'); }}",
        name = js_string(name),
        object = js_string(object),
    )
}

/// Script handing one encoded frame to the page's `_receive`.
pub fn deliver_script(object: &str, frame: &str) -> String {
    format!("window[{}]._receive({});", js_string(object), js_string(frame))
}
