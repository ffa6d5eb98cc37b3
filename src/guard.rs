//!
//! Route guard
//! -----------
//! Gates a protected view on the session and a [`RoleConstraint`]. A guard is
//! mounted against a [`SessionStore`], re-evaluates on every committed session
//! change, and unsubscribes when dropped.
//!
//!   Pending ──(no identity)──────────▶ Unauthenticated → redirect /login
//!   Pending ──(role satisfies)───────▶ Authorized      → render
//!   Pending ──(role does not satisfy)▶ Forbidden       → redirect /unauthorized
//!
//! Protected content is never rendered while the session is `Pending`.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::identity::{ResolutionState, RoleConstraint, SessionSnapshot, SessionStore, Subscription};
use crate::navigation::{LOGIN_ROUTE, UNAUTHORIZED_ROUTE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Pending,
    Unauthenticated,
    Forbidden,
    Authorized,
}

/// What the guarded slot should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Neutral placeholder while the session resolves.
    Loading,
    Redirect(&'static str),
    Render,
}

impl GuardState {
    pub fn evaluate(session: &SessionSnapshot, constraint: &RoleConstraint) -> Self {
        if session.state == ResolutionState::Pending {
            return GuardState::Pending;
        }
        match &session.identity {
            None => GuardState::Unauthenticated,
            Some(user) if constraint.is_satisfied_by(user.role) => GuardState::Authorized,
            Some(_) => GuardState::Forbidden,
        }
    }

    pub fn outcome(self) -> GuardOutcome {
        match self {
            GuardState::Pending => GuardOutcome::Loading,
            GuardState::Unauthenticated => GuardOutcome::Redirect(LOGIN_ROUTE),
            GuardState::Forbidden => GuardOutcome::Redirect(UNAUTHORIZED_ROUTE),
            GuardState::Authorized => GuardOutcome::Render,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Evaluation {
    state: GuardState,
    revision: u64,
}

fn apply(tx: &watch::Sender<Evaluation>, snapshot: &SessionSnapshot, constraint: &RoleConstraint) {
    let next = GuardState::evaluate(snapshot, constraint);
    tx.send_if_modified(|cur| {
        // deliveries can race; never step back to an older commit
        if snapshot.revision < cur.revision {
            return false;
        }
        let changed = cur.state != next;
        *cur = Evaluation { state: next, revision: snapshot.revision };
        changed
    });
}

pub struct RouteGuard {
    constraint: RoleConstraint,
    // sole strong ref; listeners hold a Weak
    _tx: Arc<watch::Sender<Evaluation>>,
    rx: watch::Receiver<Evaluation>,
    _subscription: Subscription,
}

impl RouteGuard {
    pub fn mount(store: &SessionStore, constraint: RoleConstraint) -> Self {
        let initial = store.snapshot();
        let (tx, rx) = watch::channel(Evaluation {
            state: GuardState::evaluate(&initial, &constraint),
            revision: initial.revision,
        });
        let tx = Arc::new(tx);
        let weak = Arc::downgrade(&tx);
        let listener_constraint = constraint.clone();
        let subscription = store.subscribe(move |snapshot| {
            // a callback racing with unmount is a no-op
            if let Some(tx) = weak.upgrade() {
                apply(&tx, snapshot, &listener_constraint);
            }
        });
        // pick up anything committed between the first read and subscribing
        apply(&tx, &store.snapshot(), &constraint);
        debug!(target: "guard", constraint = %constraint, state = ?rx.borrow().state, "guard mounted");
        Self { constraint, _tx: tx, rx, _subscription: subscription }
    }

    pub fn constraint(&self) -> &RoleConstraint { &self.constraint }

    pub fn state(&self) -> GuardState { self.rx.borrow().state }

    pub fn outcome(&self) -> GuardOutcome { self.state().outcome() }

    /// Wait until the guard has left `Pending`.
    pub async fn wait_settled(&self) -> GuardState {
        let mut rx = self.rx.clone();
        // the watch::Ref borrows rx; copy the state out before rx drops
        let settled = rx.wait_for(|e| e.state != GuardState::Pending).await.map(|e| e.state);
        settled.unwrap_or_else(|_| self.state())
    }

    /// Wait for the next state transition and return the new state.
    pub async fn changed(&mut self) -> GuardState {
        if self.rx.changed().await.is_err() {
            return self.state();
        }
        self.rx.borrow_and_update().state
    }
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        debug!(target: "guard", constraint = %self.constraint, "guard unmounted");
    }
}
