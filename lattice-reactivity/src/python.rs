//! Python Bindings
//!
//! Exposes signals, computeds, and effects to Python as the `_core`
//! extension module. Values are arbitrary Python objects; two values are
//! equal if they are the same object or compare equal with `==`.
//!
//! Every handle is `unsendable`: it must stay on the thread that created
//! it, like the graph it belongs to.

use pyo3::prelude::*;

use crate::reactive::{self, Computed, Effect, Signal};

/// A Python object stored in the graph.
struct PyValue(PyObject);

impl Clone for PyValue {
    fn clone(&self) -> Self {
        Python::with_gil(|py| PyValue(self.0.clone_ref(py)))
    }
}

impl PartialEq for PyValue {
    fn eq(&self, other: &Self) -> bool {
        if self.0.as_ptr() == other.0.as_ptr() {
            return true;
        }
        Python::with_gil(|py| self.0.bind(py).eq(&other.0).unwrap_or(false))
    }
}

/// Call a Python callable from inside the graph.
///
/// Graph callbacks cannot fail, so a Python exception unwinds as a panic
/// and resurfaces in Python as a `PanicException`.
fn call0(py: Python<'_>, callable: &PyObject) -> PyObject {
    match callable.call0(py) {
        Ok(value) => value,
        Err(err) => panic!("python callback raised: {err}"),
    }
}

// ----------------------------------------------------------------------------
// Signal
// ----------------------------------------------------------------------------

#[pyclass(name = "Signal", unsendable)]
pub struct PySignal {
    inner: Signal<PyValue>,
}

#[pymethods]
impl PySignal {
    #[new]
    fn new(value: PyObject) -> Self {
        Self {
            inner: Signal::new(PyValue(value)),
        }
    }

    /// Current value, tracked.
    #[getter]
    fn value(&self) -> PyObject {
        self.inner.get().0
    }

    #[setter]
    fn set_value(&self, value: PyObject) {
        self.inner.set(PyValue(value));
    }

    /// Current value, untracked.
    fn peek(&self) -> PyObject {
        self.inner.peek().0
    }

    #[getter]
    fn id(&self) -> u64 {
        self.inner.id().raw()
    }

    fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    fn __repr__(&self, py: Python<'_>) -> String {
        let value = self.inner.peek();
        let repr = value
            .0
            .bind(py)
            .repr()
            .map(|r| r.to_string())
            .unwrap_or_else(|_| "?".to_string());
        format!(
            "Signal(id={}, value={}, subscribers={})",
            self.inner.id(),
            repr,
            self.subscriber_count()
        )
    }
}

// ----------------------------------------------------------------------------
// Computed
// ----------------------------------------------------------------------------

#[pyclass(name = "Computed", unsendable)]
pub struct PyComputed {
    inner: Computed<PyValue>,
}

#[pymethods]
impl PyComputed {
    #[new]
    fn new(getter: PyObject) -> Self {
        Self {
            inner: Computed::new(move |_| Python::with_gil(|py| PyValue(call0(py, &getter)))),
        }
    }

    #[getter]
    fn value(&self) -> PyObject {
        self.inner.get().0
    }

    fn peek(&self) -> PyObject {
        self.inner.peek().0
    }

    #[getter]
    fn id(&self) -> u64 {
        self.inner.id().raw()
    }

    fn dependency_count(&self) -> usize {
        self.inner.dependency_count()
    }

    fn __repr__(&self) -> String {
        format!(
            "Computed(id={}, dependencies={}, subscribers={})",
            self.inner.id(),
            self.inner.dependency_count(),
            self.inner.subscriber_count()
        )
    }
}

// ----------------------------------------------------------------------------
// Effect
// ----------------------------------------------------------------------------

#[pyclass(name = "Effect", unsendable)]
pub struct PyEffect {
    inner: Effect,
}

#[pymethods]
impl PyEffect {
    #[new]
    fn new(body: PyObject) -> Self {
        Self {
            inner: reactive::effect(move || {
                Python::with_gil(|py| {
                    call0(py, &body);
                })
            }),
        }
    }

    fn run(&self) {
        self.inner.run();
    }

    fn stop(&self) {
        self.inner.stop();
    }

    fn pause(&self) {
        self.inner.pause();
    }

    fn resume(&self) {
        self.inner.resume();
    }

    #[getter]
    fn active(&self) -> bool {
        self.inner.is_active()
    }

    #[getter]
    fn run_count(&self) -> usize {
        self.inner.run_count()
    }

    fn __repr__(&self) -> String {
        format!(
            "Effect(id={}, active={}, runs={})",
            self.inner.id(),
            self.inner.is_active(),
            self.inner.run_count()
        )
    }
}

// ----------------------------------------------------------------------------
// Functions
// ----------------------------------------------------------------------------

/// Call `f` inside a batch; effects flush once when it returns.
#[pyfunction]
#[pyo3(name = "batch")]
fn py_batch(py: Python<'_>, f: PyObject) -> PyResult<PyObject> {
    reactive::batch(|| f.call0(py))
}

/// Run queued pre and post jobs.
#[pyfunction]
#[pyo3(name = "flush_jobs")]
fn py_flush_jobs() {
    reactive::flush_jobs();
}

/// Python module definition.
///
/// This function is called by Python when importing the module.
/// It registers all Python-exposed types and functions.
#[pymodule]
fn _core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PySignal>()?;
    m.add_class::<PyComputed>()?;
    m.add_class::<PyEffect>()?;

    m.add_function(wrap_pyfunction!(py_batch, m)?)?;
    m.add_function(wrap_pyfunction!(py_flush_jobs, m)?)?;

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;

    Ok(())
}
