//! Published proxy state.

/// What front ends render: whether the proxy is on and how traffic is routed.
///
/// `proxy_active` always starts out `false` and is never restored from a
/// previous run. `route_all` is loaded once from the settings store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProxyState {
    /// Tunnel running and system proxy settings applied.
    pub proxy_active: bool,
    /// Send every connection through the tunnel instead of only whitelisted networks.
    pub route_all: bool,
}

/// Receives every published state change.
pub trait StateListener: Send {
    fn state_changed(&self, state: &ProxyState);
}

impl<F> StateListener for F
where
    F: Fn(&ProxyState) + Send,
{
    fn state_changed(&self, state: &ProxyState) {
        self(state);
    }
}

/// Owns the current [`ProxyState`] and notifies subscribers on each mutation.
#[derive(Default)]
pub struct StateHolder {
    state: ProxyState,
    listeners: Vec<Box<dyn StateListener>>,
}

impl StateHolder {
    #[must_use]
    pub fn new(initial: ProxyState) -> Self {
        Self {
            state: initial,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub const fn current(&self) -> ProxyState {
        self.state
    }

    pub fn subscribe(&mut self, listener: Box<dyn StateListener>) {
        self.listeners.push(listener);
    }

    /// Replaces the state and publishes it, even if unchanged.
    pub fn publish(&mut self, state: ProxyState) {
        self.state = state;
        for listener in &self.listeners {
            listener.state_changed(&self.state);
        }
    }

    pub fn set_active(&mut self, proxy_active: bool) {
        self.publish(ProxyState {
            proxy_active,
            ..self.state
        });
    }

    pub fn set_route_all(&mut self, route_all: bool) {
        self.publish(ProxyState {
            route_all,
            ..self.state
        });
    }
}

impl std::fmt::Debug for StateHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateHolder")
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
