use crate::{request::predicate::Predicate, types::Id, value::Value};

///
/// AttributeSelection
/// One requested attribute, optionally parameterized.
///

#[derive(Clone, Debug)]
pub struct AttributeSelection {
    pub name: String,
    pub args: Vec<(String, Value)>,
}

impl AttributeSelection {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.args.push((name.into(), value));
        self
    }
}

///
/// OrderDirection
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

///
/// OrderKey
///

#[derive(Clone, Debug)]
pub struct OrderKey {
    pub field: String,
    pub direction: OrderDirection,
}

impl OrderKey {
    #[must_use]
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    #[must_use]
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

///
/// Page
///

#[derive(Clone, Copy, Debug, Default)]
pub struct Page {
    pub limit: Option<u32>,
    pub offset: u32,
}

impl Page {
    #[must_use]
    pub const fn new(limit: Option<u32>, offset: u32) -> Self {
        Self { limit, offset }
    }
}

///
/// Projection
///
/// One node of the request graph: the client-requested subset of a
/// model's attributes and relationships, with optional filter, order,
/// and page directives. Immutable once execution begins.
///

#[derive(Clone, Debug)]
pub struct Projection {
    pub model: String,
    pub attributes: Vec<AttributeSelection>,
    pub relationships: Vec<(String, Projection)>,
    pub filter: Option<Predicate>,
    pub order: Vec<OrderKey>,
    pub page: Option<Page>,
    /// Id-addressed root; None selects the whole (filtered) collection.
    pub target: Option<Id>,
}

impl Projection {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
            filter: None,
            order: Vec::new(),
            page: None,
            target: None,
        }
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(AttributeSelection::new(name));
        self
    }

    #[must_use]
    pub fn attribute_selection(mut self, selection: AttributeSelection) -> Self {
        self.attributes.push(selection);
        self
    }

    #[must_use]
    pub fn relationship(mut self, name: impl Into<String>, nested: Self) -> Self {
        self.relationships.push((name.into(), nested));
        self
    }

    #[must_use]
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filter = Some(predicate);
        self
    }

    #[must_use]
    pub fn order_by(mut self, key: OrderKey) -> Self {
        self.order.push(key);
        self
    }

    #[must_use]
    pub const fn page(mut self, page: Page) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub const fn target(mut self, id: Id) -> Self {
        self.target = Some(id);
        self
    }
}
