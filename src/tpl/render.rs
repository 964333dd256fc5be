use crate::config::UnknownBlock;
use crate::error::RenderError;
use crate::tpl::ast::{Block, Call, Node, Param, Partial};
use crate::tpl::helpers::{Builtin, Helper, HelperDef};
use crate::tpl::render_context::{Frame, RenderContext};
use crate::tpl::template::Template;
use crate::value::{Map, Value};
use log::debug;
use std::borrow::Cow;
use std::sync::Arc;

/// Name under which a partial block's body is visible inside the partial.
const PARTIAL_BLOCK: &str = "@partial-block";

/// What a helper name refers to at render time. User helpers shadow builtins;
/// anything else is plain data.
enum Dispatch {
    User(Arc<dyn HelperDef>),
    Builtin(Builtin),
    DataPath,
}

/// Where the nodes of a partial come from.
enum PartialSource {
    Template(Arc<Template>),
    Nodes(Arc<[Node]>),
}

impl PartialSource {
    fn nodes(&self) -> &[Node] {
        match self {
            PartialSource::Template(template) => template.nodes(),
            PartialSource::Nodes(nodes) => &nodes[..],
        }
    }
}

impl<'r, 'a> RenderContext<'r, 'a> {
    /// Renders `nodes` against the current scope stack, appending to the output.
    ///
    /// Inline partials declared among `nodes` are visible to all of them and
    /// to everything they render, wherever the declaration sits.
    pub fn render(&mut self, nodes: &[Node]) -> Result<(), RenderError> {
        if self.depth >= self.config.max_nesting {
            return Err(RenderError::NestingTooDeep {
                limit: self.config.max_nesting,
            });
        }
        let mark = self.inlines.len();
        self.declare_inlines(nodes);
        self.depth += 1;
        let result = self.render_nodes(nodes);
        self.depth -= 1;
        self.inlines.truncate(mark);
        result
    }

    fn render_nodes(&mut self, nodes: &[Node]) -> Result<(), RenderError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.write(text),
                Node::Expression { call, escape } => self.render_expression(call, *escape)?,
                Node::Block(block) => self.render_block(block)?,
                Node::Partial(partial) => self.render_partial(partial)?,
                Node::Inline { .. } => {}
            }
        }
        Ok(())
    }

    fn declare_inlines(&mut self, nodes: &[Node]) {
        for node in nodes {
            if let Node::Inline { name, body } = node {
                self.inlines.push((name.clone(), body.clone()));
            }
        }
    }

    fn inline_partial(&self, name: &str) -> Option<Arc<[Node]>> {
        self.inlines
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, body)| body.clone())
    }

    /// Renders `nodes` with `frame` pushed as the innermost scope.
    pub fn render_with(&mut self, nodes: &[Node], frame: Frame<'a>) -> Result<(), RenderError> {
        self.push_frame(frame);
        let result = self.render(nodes);
        self.pop_frame();
        result
    }

    /// Resolves an argument: literals as themselves, paths against the scope
    /// stack, sub-expressions through their helper's value form.
    pub fn eval_param(&self, param: &Param) -> Result<Cow<'a, Value>, RenderError> {
        match param {
            Param::Literal(value) => Ok(Cow::Owned(value.clone())),
            Param::Path(path) => Ok(self.resolve(path)),
            Param::SubExpr(call) => self.eval_call(call).map(Cow::Owned),
        }
    }

    fn dispatch(&self, call: &Call) -> Dispatch {
        if !call.names_helper() {
            return Dispatch::DataPath;
        }
        if let Some(def) = self.registry.helper(&call.name) {
            return Dispatch::User(def);
        }
        match Builtin::from_name(&call.name) {
            Some(builtin) => Dispatch::Builtin(builtin),
            None => Dispatch::DataPath,
        }
    }

    fn helper_for<'t>(
        &self,
        call: &'t Call,
        block: Option<&'t Block>,
        escape: bool,
    ) -> Result<Helper<'a, 't>, RenderError> {
        let params = call
            .params
            .iter()
            .map(|p| self.eval_param(p))
            .collect::<Result<Vec<_>, _>>()?;
        let hash = call
            .hash
            .iter()
            .map(|(key, p)| Ok((key.as_str(), self.eval_param(p)?)))
            .collect::<Result<Vec<_>, RenderError>>()?;
        Ok(Helper {
            name: &call.name,
            params,
            hash,
            body: block.map(|b| b.body.as_slice()).unwrap_or(&[]),
            inverse: block.and_then(|b| b.inverse.as_deref()),
            block_params: block.map(|b| b.block_params.as_slice()).unwrap_or(&[]),
            block: block.is_some(),
            escape,
        })
    }

    /// Unknown helpers fail in strict mode and are skipped otherwise.
    fn unknown_helper(&self, name: &str) -> Result<(), RenderError> {
        if self.config.strict {
            return Err(RenderError::UnknownHelper(name.to_string()));
        }
        debug!("Unknown helper `{}` rendered as empty", name);
        Ok(())
    }

    /// Value of a sub-expression.
    fn eval_call(&self, call: &Call) -> Result<Value, RenderError> {
        let value = match self.dispatch(call) {
            Dispatch::User(def) => def.call_value(&self.helper_for(call, None, false)?, self)?,
            Dispatch::Builtin(builtin) => {
                builtin.call_value(&self.helper_for(call, None, false)?, self)?
            }
            Dispatch::DataPath if call.is_plain() => {
                return self.eval_param(&call.head).map(Cow::into_owned);
            }
            Dispatch::DataPath => {
                self.unknown_helper(&call.name)?;
                None
            }
        };
        Ok(value.unwrap_or_default())
    }

    fn render_expression(&mut self, call: &Call, escape: bool) -> Result<(), RenderError> {
        match self.dispatch(call) {
            Dispatch::User(def) => {
                let h = self.helper_for(call, None, escape)?;
                def.call(&h, self)
            }
            Dispatch::Builtin(builtin) => {
                let h = self.helper_for(call, None, escape)?;
                builtin.call(&h, self)
            }
            Dispatch::DataPath if call.is_plain() => {
                let value = self.eval_param(&call.head)?;
                self.write_value(&value, escape);
                Ok(())
            }
            Dispatch::DataPath => self.unknown_helper(&call.name),
        }
    }

    fn render_block(&mut self, block: &Block) -> Result<(), RenderError> {
        let dispatch = self.dispatch(&block.call);
        let h = self.helper_for(&block.call, Some(block), true)?;
        match dispatch {
            Dispatch::User(def) => def.call(&h, self),
            Dispatch::Builtin(builtin) => builtin.call(&h, self),
            Dispatch::DataPath => self.render_unknown_block(block, &h),
        }
    }

    /// A block whose name is neither a registered helper nor a builtin.
    ///
    /// The subject is the first argument, or the value at the block's own
    /// path when it has none. What happens next is `RenderConfig::unknown_block`.
    fn render_unknown_block<'t>(
        &mut self,
        block: &'t Block,
        h: &Helper<'a, 't>,
    ) -> Result<(), RenderError> {
        if self.config.strict {
            return Err(RenderError::UnknownHelper(block.call.name.clone()));
        }
        let subject = match h.scoped_param(0) {
            Some(value) => value.clone(),
            None => self.eval_param(&block.call.head)?,
        };

        match self.config.unknown_block {
            UnknownBlock::Skip => {
                debug!("Unknown block `{}` skipped", block.call.name);
                Ok(())
            }
            UnknownBlock::Section if matches!(subject.as_ref(), Value::List(_)) => {
                Builtin::Each.call(&h.with_subject(subject), self)
            }
            UnknownBlock::Section if matches!(subject.as_ref(), Value::Map(_)) => {
                Builtin::With.call(&h.with_subject(subject), self)
            }
            UnknownBlock::Truthy | UnknownBlock::Section => {
                if subject.is_truthy() {
                    self.render(h.body())
                } else {
                    h.render_inverse(self)
                }
            }
        }
    }

    /// Expands `{{> name}}` and `{{#> name}}...{{/name}}`.
    ///
    /// Names resolve to inline partials in scope first, then to registered
    /// templates. A partial block falls back to its own body when neither
    /// exists; otherwise its body becomes `@partial-block` inside the partial.
    fn render_partial(&mut self, partial: &Partial) -> Result<(), RenderError> {
        if self.partials.len() >= self.config.max_depth {
            return Err(RenderError::RecursionLimitExceeded {
                name: partial.name.clone(),
                limit: self.config.max_depth,
            });
        }
        let frame = self.partial_frame(partial)?;

        // `@partial-block` renders with the partials visible where the block
        // was written, so entries from that point on are set aside meanwhile.
        let mut hidden = Vec::new();
        let mut declares_block = false;
        let source = if partial.name == PARTIAL_BLOCK {
            match self.inlines.iter().rposition(|(n, _)| n == PARTIAL_BLOCK) {
                Some(i) => {
                    hidden = self.inlines.split_off(i);
                    PartialSource::Nodes(hidden[0].1.clone())
                }
                None => return self.unknown_partial(partial),
            }
        } else if let Some(body) = self.inline_partial(&partial.name) {
            declares_block = true;
            PartialSource::Nodes(body)
        } else if let Some(template) = self.registry.get_template(&partial.name) {
            declares_block = true;
            PartialSource::Template(template)
        } else if let Some(block) = &partial.block {
            debug!("Partial `{}` not found, rendering its block", partial.name);
            PartialSource::Nodes(block.clone())
        } else {
            return self.unknown_partial(partial);
        };

        let base = self.inlines.len();
        if let (true, Some(block)) = (declares_block, &partial.block) {
            self.declare_inlines(block);
            self.inlines.push((PARTIAL_BLOCK.to_string(), block.clone()));
        }

        self.partials.push(partial.name.clone());
        let start = self.output().len();
        let result = match frame {
            Some(frame) => self.render_with(source.nodes(), frame),
            None => self.render(source.nodes()),
        };
        self.partials.pop();
        self.inlines.truncate(base);
        self.inlines.extend(hidden);

        if !partial.indent.is_empty() {
            self.indent_since(start, &partial.indent);
        }
        result
    }

    /// Unknown partials fail in strict mode and render as empty otherwise.
    fn unknown_partial(&self, partial: &Partial) -> Result<(), RenderError> {
        if self.config.strict {
            return Err(RenderError::UnknownPartial(partial.name.clone()));
        }
        debug!("Unknown partial `{}` rendered as empty", partial.name);
        Ok(())
    }

    /// The frame a partial renders in: its explicit context merged with its
    /// hash arguments, or `None` to keep the caller's scope.
    fn partial_frame(&self, partial: &Partial) -> Result<Option<Frame<'a>>, RenderError> {
        if partial.context.is_none() && partial.hash.is_empty() {
            return Ok(None);
        }
        let base = match &partial.context {
            Some(param) => self.eval_param(param)?,
            None => self.current_scoped(),
        };
        let value = if partial.hash.is_empty() {
            base
        } else {
            let mut map = match base.into_owned() {
                Value::Map(map) => map,
                _ => Map::new(),
            };
            for (key, param) in &partial.hash {
                map.insert(key.clone(), self.eval_param(param)?.into_owned());
            }
            Cow::Owned(Value::Map(map))
        };
        Ok(Some(Frame::new(value)))
    }
}
