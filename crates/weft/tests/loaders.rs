//! Loader implementations over real storage.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tempfile::TempDir;
use weft::{Environment, Loader, Template, Value, WeftError};

/// Loads templates from files under a root directory.
struct DirLoader {
    root: PathBuf,
}

impl Loader for DirLoader {
    fn load<'env>(
        &self,
        env: &'env Environment,
        name: &str,
        globals: HashMap<String, Value>,
    ) -> weft::Result<Template<'env>> {
        let path = self.root.join(name);
        let source = fs::read_to_string(&path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                WeftError::TemplateNotFound(name.to_string())
            } else {
                WeftError::from(err)
            }
        })?;
        env.from_string(&source, Some(name), Some(globals))
    }
}

/// Wraps another loader and records every requested name.
struct CountingLoader<L> {
    inner: L,
    loads: Arc<Mutex<Vec<String>>>,
}

impl<L: Loader> Loader for CountingLoader<L> {
    fn load<'env>(
        &self,
        env: &'env Environment,
        name: &str,
        globals: HashMap<String, Value>,
    ) -> weft::Result<Template<'env>> {
        self.loads.lock().unwrap().push(name.to_string());
        self.inner.load(env, name, globals)
    }
}

fn write_templates(dir: &TempDir, entries: &[(&str, &str)]) {
    for (name, source) in entries {
        fs::write(dir.path().join(name), source).unwrap();
    }
}

#[test]
fn test_directory_loader_renders_from_disk() {
    let dir = TempDir::new().unwrap();
    write_templates(&dir, &[("page.txt", "Hello {{ name }}!")]);

    let mut env = Environment::new();
    env.set_loader(DirLoader {
        root: dir.path().to_path_buf(),
    });
    let template = env.get_template("page.txt", None, None).unwrap();
    assert_eq!(template.name(), Some("page.txt"));
    assert_eq!(
        template.render(json!({ "name": "Ada" })).unwrap(),
        "Hello Ada!"
    );
}

#[test]
fn test_missing_file_is_template_not_found() {
    let dir = TempDir::new().unwrap();
    let mut env = Environment::new();
    env.set_loader(DirLoader {
        root: dir.path().to_path_buf(),
    });
    let err = env.get_template("absent.txt", None, None).unwrap_err();
    assert!(matches!(err, WeftError::TemplateNotFound(ref name) if name == "absent.txt"));
}

#[test]
fn test_inheritance_resolves_across_files() {
    let dir = TempDir::new().unwrap();
    write_templates(
        &dir,
        &[
            ("base.txt", "<{% block body %}fallback{% endblock %}>"),
            (
                "child.txt",
                "{% extends 'base.txt' %}{% block body %}{{ super() }}+{{ word }}{% endblock %}",
            ),
        ],
    );

    let mut env = Environment::new();
    env.set_loader(DirLoader {
        root: dir.path().to_path_buf(),
    });
    let template = env.get_template("child.txt", None, None).unwrap();
    let rendered = template.render(json!({ "word": "own" })).unwrap();
    assert_eq!(rendered, "<fallback+own>");
}

#[test]
fn test_loader_receives_the_merged_globals() {
    let dir = TempDir::new().unwrap();
    write_templates(&dir, &[("page.txt", "{{ a }}{{ b }}")]);

    let mut env = Environment::new();
    env.add_global("a", 1i64);
    env.set_loader(DirLoader {
        root: dir.path().to_path_buf(),
    });
    let mut overlay = HashMap::new();
    overlay.insert("b".to_string(), Value::from(2i64));
    let template = env.get_template("page.txt", None, Some(overlay)).unwrap();
    assert_eq!(template.globals().len(), 2);
    assert_eq!(template.render(()).unwrap(), "12");
}

#[test]
fn test_each_extends_asks_the_loader_again() {
    let dir = TempDir::new().unwrap();
    write_templates(
        &dir,
        &[
            ("base.txt", "{% block b %}{% endblock %}"),
            (
                "child.txt",
                "{% extends 'base.txt' %}{% block b %}x{% endblock %}",
            ),
        ],
    );

    let loads = Arc::new(Mutex::new(Vec::new()));
    let mut env = Environment::new();
    env.set_loader(CountingLoader {
        inner: DirLoader {
            root: dir.path().to_path_buf(),
        },
        loads: loads.clone(),
    });
    let template = env.get_template("child.txt", None, None).unwrap();
    template.render(()).unwrap();
    template.render(()).unwrap();

    // Each render follows the extends chain through the loader; caching,
    // if wanted, is the loader's business.
    assert_eq!(
        loads.lock().unwrap().as_slice(),
        ["child.txt", "base.txt", "base.txt"]
    );
}

#[test]
fn test_unreadable_source_surfaces_io_errors() {
    let dir = TempDir::new().unwrap();
    // A directory where a file is expected: reading it fails with
    // something other than NotFound.
    fs::create_dir(dir.path().join("nested.txt")).unwrap();

    let mut env = Environment::new();
    env.set_loader(DirLoader {
        root: dir.path().to_path_buf(),
    });
    let err = env.get_template("nested.txt", None, None).unwrap_err();
    assert!(matches!(err, WeftError::Io(_)));
}

#[test]
fn test_syntax_errors_from_loaded_files_name_the_template() {
    let dir = TempDir::new().unwrap();
    write_templates(&dir, &[("broken.txt", "{% if x %}no end")]);

    let mut env = Environment::new();
    env.set_loader(DirLoader {
        root: dir.path().to_path_buf(),
    });
    let err = env.get_template("broken.txt", None, None).unwrap_err();
    assert!(matches!(err, WeftError::Syntax(_)));
    assert!(err.to_string().contains("broken.txt"));
}
