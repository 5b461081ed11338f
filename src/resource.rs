//! Conventional CRUD resources.
//!
//! A [`Resource`] is a label plus up to seven actions. Each action that is
//! present becomes a route under the resource's path; the rest are simply not
//! registered and answer 404.
//!
//! | Action | Method | Path |
//! |---|---|---|
//! | `Index` | `GET` | `/posts` |
//! | `Create` | `POST` | `/posts` |
//! | `New` | `GET` | `/posts/new` |
//! | `Show` | `GET` | `/posts/{id}` |
//! | `Edit` | `GET` | `/posts/{id}/edit` |
//! | `Update` | `PUT`, `PATCH` | `/posts/{id}` |
//! | `Destroy` | `DELETE` | `/posts/{id}` |

use std::fmt;

use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;

/// One of the seven conventional resource actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Index,
    Create,
    New,
    Show,
    Edit,
    Update,
    Destroy,
}

impl Action {
    /// Registration order.
    pub const ALL: [Action; 7] = [
        Self::Index,
        Self::Create,
        Self::New,
        Self::Show,
        Self::Edit,
        Self::Update,
        Self::Destroy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Index   => "Index",
            Self::Create  => "Create",
            Self::New     => "New",
            Self::Show    => "Show",
            Self::Edit    => "Edit",
            Self::Update  => "Update",
            Self::Destroy => "Destroy",
        }
    }

    /// Method and path suffix (relative to the resource prefix) of every
    /// route this action answers.
    pub fn routes(self) -> &'static [(Method, &'static str)] {
        match self {
            Self::Index   => &[(Method::Get, "")],
            Self::Create  => &[(Method::Post, "")],
            Self::New     => &[(Method::Get, "/new")],
            Self::Show    => &[(Method::Get, "/{id}")],
            Self::Edit    => &[(Method::Get, "/{id}/edit")],
            Self::Update  => &[(Method::Put, "/{id}"), (Method::Patch, "/{id}")],
            Self::Destroy => &[(Method::Delete, "/{id}")],
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The actions a resource supports.
///
/// ```rust
/// use railyard::{ActionResult, Context, Resource, Router};
///
/// async fn index(ctx: Context) -> ActionResult { ctx.text(railyard::StatusCode::OK, "all") }
/// async fn show(ctx: Context) -> ActionResult { ctx.text(railyard::StatusCode::OK, "one") }
///
/// let router = Router::new().resource(
///     "posts",
///     Resource::new("PostsController").index(index).show(show),
/// );
/// assert_eq!(router.routes().len(), 2);
/// ```
#[derive(Clone)]
pub struct Resource {
    label: String,
    handlers: [Option<BoxedHandler>; 7],
}

impl Resource {
    /// `label` names the resource in route listings (`PostsController#Show`).
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), handlers: Default::default() }
    }

    pub fn index(self, handler: impl Handler) -> Self {
        self.with(Action::Index, handler)
    }

    pub fn create(self, handler: impl Handler) -> Self {
        self.with(Action::Create, handler)
    }

    pub fn new_form(self, handler: impl Handler) -> Self {
        self.with(Action::New, handler)
    }

    pub fn show(self, handler: impl Handler) -> Self {
        self.with(Action::Show, handler)
    }

    pub fn edit(self, handler: impl Handler) -> Self {
        self.with(Action::Edit, handler)
    }

    pub fn update(self, handler: impl Handler) -> Self {
        self.with(Action::Update, handler)
    }

    pub fn destroy(self, handler: impl Handler) -> Self {
        self.with(Action::Destroy, handler)
    }

    /// Sets the handler for any action.
    pub fn with(mut self, action: Action, handler: impl Handler) -> Self {
        self.handlers[action.index()] = Some(handler.into_boxed_handler());
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn has(&self, action: Action) -> bool {
        self.handlers[action.index()].is_some()
    }

    /// Present actions in registration order.
    pub(crate) fn actions(&self) -> impl Iterator<Item = (Action, &BoxedHandler)> {
        Action::ALL
            .into_iter()
            .filter_map(|a| self.handlers[a.index()].as_ref().map(|h| (a, h)))
    }
}
