use std::sync::Arc;

use async_trait::async_trait;
use boa_engine::{
    Context, JsError, JsResult, JsValue, NativeFunction, Source, js_string,
    object::ObjectInitializer, property::Attribute,
};
use boa_gc::{Gc, GcRefCell};

use crate::dispatch::{
    Runner,
    fault::ExecutionFault,
    models::{ExecutionRequest, RawOutcome},
};

/// Ordered console lines captured during one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub lines: Vec<String>,
}

impl Transcript {
    pub fn joined(&self) -> String {
        self.lines.join("\n")
    }
}

/// Evaluates untrusted code inside the host process.
///
/// Implementations must not hand the code any filesystem or network
/// primitive. The only side channel is the returned transcript.
pub trait Sandbox: Send + Sync {
    fn name(&self) -> &'static str;
    fn evaluate(&self, code: &str) -> Result<Transcript, ExecutionFault>;
}

#[derive(Debug, Clone, Copy)]
pub struct InlineLimits {
    pub loop_iterations: u64,
    pub recursion_depth: usize,
}

/// JavaScript via the embedded Boa engine, one fresh realm per call.
pub struct BoaSandbox {
    limits: InlineLimits,
}

impl BoaSandbox {
    pub fn new(limits: InlineLimits) -> Self {
        Self { limits }
    }
}

type Lines = Gc<GcRefCell<Vec<String>>>;

impl Sandbox for BoaSandbox {
    fn name(&self) -> &'static str {
        "boa"
    }

    fn evaluate(&self, code: &str) -> Result<Transcript, ExecutionFault> {
        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(self.limits.loop_iterations);
        context
            .runtime_limits_mut()
            .set_recursion_limit(self.limits.recursion_depth);

        let lines: Lines = Gc::new(GcRefCell::new(Vec::new()));
        install_console(&mut context, &lines)
            .map_err(|err| ExecutionFault::Internal(format!("console shim: {err}")))?;

        // Function body semantics: top-level `return` is allowed.
        let wrapped = format!("(function () {{\n{code}\n}})();");
        if let Err(err) = context.eval(Source::from_bytes(wrapped.as_str())) {
            return Err(evaluation_fault(&err, &mut context));
        }

        let captured = lines.borrow().to_vec();
        Ok(Transcript { lines: captured })
    }
}

fn install_console(context: &mut Context, lines: &Lines) -> JsResult<()> {
    let console = ObjectInitializer::new(context)
        .function(console_method("", lines), js_string!("log"), 0)
        .function(console_method("", lines), js_string!("info"), 0)
        .function(console_method("", lines), js_string!("debug"), 0)
        .function(console_method("WARNING: ", lines), js_string!("warn"), 0)
        .function(console_method("ERROR: ", lines), js_string!("error"), 0)
        .build();
    context.register_global_property(js_string!("console"), console, Attribute::all())
}

fn console_method(prefix: &'static str, lines: &Lines) -> NativeFunction {
    NativeFunction::from_copy_closure_with_captures(
        move |_this, args, lines: &Lines, context| {
            let mut parts = Vec::with_capacity(args.len());
            for arg in args {
                parts.push(arg.to_string(context)?.to_std_string_escaped());
            }
            lines
                .borrow_mut()
                .push(format!("{prefix}{}", parts.join(" ")));
            Ok(JsValue::undefined())
        },
        lines.clone(),
    )
}

fn evaluation_fault(err: &JsError, context: &mut Context) -> ExecutionFault {
    let trace = err.to_string();
    // Engine-raised errors (ReferenceError, TypeError, limits) are native.
    if let Some(native) = err.as_native() {
        return ExecutionFault::Evaluation {
            message: native.message().to_string(),
            trace,
        };
    }

    let message = err
        .as_opaque()
        .and_then(|value| value.as_object().cloned())
        .and_then(|object| object.get(js_string!("message"), context).ok())
        .filter(|value| !value.is_undefined())
        .and_then(|value| value.to_string(context).ok())
        .map(|message| message.to_std_string_escaped())
        .unwrap_or_else(|| trace.clone());

    ExecutionFault::Evaluation { message, trace }
}

/// Runs the one language embeddable in-process. Standard input is not
/// consumed on this path; `request.stdin` is ignored.
pub struct LocalInlineRunner {
    sandbox: Arc<dyn Sandbox>,
}

impl LocalInlineRunner {
    pub fn new(sandbox: Arc<dyn Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Runner for LocalInlineRunner {
    fn name(&self) -> &'static str {
        "inline"
    }

    async fn run(&self, request: ExecutionRequest) -> Result<RawOutcome, ExecutionFault> {
        if !request.stdin.is_empty() {
            tracing::debug!(
                sandbox = self.sandbox.name(),
                stdin_bytes = request.stdin.len(),
                "inline runner ignores stdin"
            );
        }

        let sandbox = self.sandbox.clone();
        let transcript =
            tokio::task::spawn_blocking(move || sandbox.evaluate(&request.code)).await??;

        Ok(RawOutcome::new(transcript.joined(), String::new()))
    }
}
