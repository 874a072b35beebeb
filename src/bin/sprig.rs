//! sprig CLI: thin commands over the repository operations.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use sprig::{
    Error, InitOptions, ObjectKind, RefTarget, Repository, Result, Signature, Status, TreeEntry,
};

#[derive(Parser)]
#[command(name = "sprig", about = "sprig: a small content-addressed version control core", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty repository.
    Init {
        /// Directory to create the repository in.
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Branch HEAD starts out on.
        #[arg(long, default_value = "master")]
        initial_branch: String,
    },

    /// Compute the object id of a file, optionally storing it.
    HashObject {
        /// Store the object.
        #[arg(short = 'w')]
        write: bool,

        /// Object kind: blob, tree, commit or tag.
        #[arg(short = 't', default_value = "blob")]
        kind: String,

        path: PathBuf,
    },

    /// Print an object's payload.
    CatFile {
        /// Print the object's kind instead of its payload.
        #[arg(short = 't')]
        show_type: bool,

        object: String,
    },

    /// Resolve a revision to an object id.
    RevParse {
        /// Peel the result to this kind.
        #[arg(long = "type")]
        kind: Option<String>,

        name: String,
    },

    /// List refs with the ids they resolve to.
    ShowRef,

    /// List staged paths.
    LsFiles {
        /// Show mode and object id too.
        #[arg(long, short)]
        stage: bool,
    },

    /// List the contents of a tree.
    LsTree {
        /// Recurse into subtrees.
        #[arg(short = 'r')]
        recursive: bool,

        tree: String,
    },

    /// Stage files and directories.
    Add {
        /// Stage the whole worktree.
        #[arg(long, short = 'A')]
        all: bool,

        paths: Vec<PathBuf>,
    },

    /// Show new, changed and deleted paths.
    Status {
        /// Print JSON.
        #[arg(long)]
        json: bool,
    },

    /// Store the staged tree and print its id.
    WriteTree,

    /// Commit the staged tree on the current branch.
    Commit {
        #[arg(long, short)]
        message: String,

        #[arg(long, env = "SPRIG_AUTHOR_NAME")]
        author_name: Option<String>,

        #[arg(long, env = "SPRIG_AUTHOR_EMAIL")]
        author_email: Option<String>,
    },

    /// Show the commits reachable from a revision.
    Log {
        #[arg(default_value = "HEAD")]
        rev: String,

        /// Print the parent graph in Graphviz dot format.
        #[arg(long)]
        graph: bool,
    },

    /// Write a revision's tree into an empty directory.
    Checkout {
        rev: String,

        /// Destination; created when missing, must be empty otherwise.
        path: PathBuf,
    },

    /// List tags, or create one.
    Tag {
        name: Option<String>,

        /// Object to tag.
        #[arg(default_value = "HEAD")]
        object: String,

        /// Store an annotated tag object.
        #[arg(short = 'a')]
        annotate: bool,

        /// Annotation message (implies -a).
        #[arg(short = 'm')]
        message: Option<String>,
    },

    /// List branches, or create or delete one.
    Branch {
        name: Option<String>,

        /// Commit the new branch starts at.
        #[arg(default_value = "HEAD")]
        start: String,

        /// Delete the branch.
        #[arg(short = 'd')]
        delete: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let cwd = std::env::current_dir().unwrap_or_else(|e| {
        eprintln!("error: cannot determine current directory: {e}");
        process::exit(1);
    });

    let result = match cli.command {
        Commands::Init {
            path,
            initial_branch,
        } => cmd_init(&cwd.join(path), initial_branch),
        Commands::HashObject { write, kind, path } => cmd_hash_object(&cwd, &cwd.join(path), &kind, write),
        Commands::CatFile { show_type, object } => cmd_cat_file(&cwd, &object, show_type),
        Commands::RevParse { kind, name } => cmd_rev_parse(&cwd, &name, kind.as_deref()),
        Commands::ShowRef => cmd_show_ref(&cwd),
        Commands::LsFiles { stage } => cmd_ls_files(&cwd, stage),
        Commands::LsTree { recursive, tree } => cmd_ls_tree(&cwd, &tree, recursive),
        Commands::Add { all, paths } => cmd_add(&cwd, all, paths),
        Commands::Status { json } => cmd_status(&cwd, json),
        Commands::WriteTree => cmd_write_tree(&cwd),
        Commands::Commit {
            message,
            author_name,
            author_email,
        } => cmd_commit(&cwd, &message, author_name, author_email),
        Commands::Log { rev, graph } => cmd_log(&cwd, &rev, graph),
        Commands::Checkout { rev, path } => cmd_checkout(&cwd, &rev, &cwd.join(path)),
        Commands::Tag {
            name,
            object,
            annotate,
            message,
        } => cmd_tag(&cwd, name, &object, annotate, message),
        Commands::Branch {
            name,
            start,
            delete,
        } => cmd_branch(&cwd, name, &start, delete),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(exit_code(&e));
    }
}

fn exit_code(err: &Error) -> i32 {
    match err {
        Error::NotFound(_) | Error::Ambiguous { .. } | Error::InvalidArgument(_) => 128,
        _ => 1,
    }
}

fn open_repo(cwd: &Path) -> Result<Repository> {
    Repository::discover(cwd)?.ok_or_else(|| {
        Error::not_found(format!(
            "not a sprig repository (or any parent up to /): {}",
            cwd.display()
        ))
    })
}

fn parse_kind(kind: &str) -> Result<ObjectKind> {
    kind.parse()
}

fn cmd_init(path: &Path, initial_branch: String) -> Result<()> {
    let repo = Repository::init(
        path,
        InitOptions {
            initial_branch,
            ..InitOptions::default()
        },
    )?;
    println!("Initialized empty repository in {}", repo.meta_dir().display());
    Ok(())
}

fn cmd_hash_object(cwd: &Path, path: &Path, kind: &str, write: bool) -> Result<()> {
    let kind = parse_kind(kind)?;
    let id = if write {
        open_repo(cwd)?.hash_file(path, kind, true)?
    } else {
        let data = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        if kind != ObjectKind::Blob {
            sprig::Object::deserialize(kind, &data)?;
        }
        sprig::hash::hash_object(kind, &data)
    };
    println!("{id}");
    Ok(())
}

fn cmd_cat_file(cwd: &Path, object: &str, show_type: bool) -> Result<()> {
    let repo = open_repo(cwd)?;
    let id = repo.rev_parse(object, None)?;
    let obj = repo.read_object(id)?;
    if show_type {
        println!("{}", obj.kind());
        return Ok(());
    }
    let mut out = std::io::stdout().lock();
    match &obj {
        sprig::Object::Tree(tree) => {
            for entry in tree.entries() {
                writeln!(out, "{}", format_tree_entry(entry, &entry.name_lossy()))?;
            }
        }
        other => out.write_all(&other.serialize())?,
    }
    Ok(())
}

fn cmd_rev_parse(cwd: &Path, name: &str, kind: Option<&str>) -> Result<()> {
    let repo = open_repo(cwd)?;
    let kind = kind.map(parse_kind).transpose()?;
    println!("{}", repo.rev_parse(name, kind)?);
    Ok(())
}

fn cmd_show_ref(cwd: &Path) -> Result<()> {
    let repo = open_repo(cwd)?;
    for (name, id) in repo.list_refs()?.flatten("refs") {
        println!("{id} {name}");
    }
    Ok(())
}

fn cmd_ls_files(cwd: &Path, stage: bool) -> Result<()> {
    let repo = open_repo(cwd)?;
    for entry in repo.load_index()? {
        if stage {
            println!("{:06o} {} {}\t{}", entry.mode, entry.id, entry.stage(), entry.path);
        } else {
            println!("{}", entry.path);
        }
    }
    Ok(())
}

fn format_tree_entry(entry: &TreeEntry, path: &str) -> String {
    let kind = if entry.is_tree() { "tree" } else { "blob" };
    format!("{:06o} {} {}\t{}", entry.mode, kind, entry.id, path)
}

fn cmd_ls_tree(cwd: &Path, tree: &str, recursive: bool) -> Result<()> {
    let repo = open_repo(cwd)?;
    let id = repo.rev_parse(tree, Some(ObjectKind::Tree))?;
    if recursive {
        for (path, entry) in repo.read_tree_recursive(id)? {
            println!("{}", format_tree_entry(&entry, &path));
        }
    } else {
        let tree = sprig::tree::read_tree(repo.objects(), id)?;
        for entry in tree.entries() {
            println!("{}", format_tree_entry(entry, &entry.name_lossy()));
        }
    }
    Ok(())
}

fn cmd_add(cwd: &Path, all: bool, paths: Vec<PathBuf>) -> Result<()> {
    let repo = open_repo(cwd)?;
    let paths: Vec<PathBuf> = if all {
        vec![repo.worktree().to_path_buf()]
    } else if paths.is_empty() {
        return Err(Error::invalid_argument("nothing specified, nothing added"));
    } else {
        paths.into_iter().map(|p| cwd.join(p)).collect()
    };
    repo.stage(&paths)?;
    Ok(())
}

fn print_section(title: &str, paths: &std::collections::BTreeSet<String>) {
    if paths.is_empty() {
        return;
    }
    println!("{title}:");
    for path in paths {
        println!("    {path}");
    }
}

fn cmd_status(cwd: &Path, json: bool) -> Result<()> {
    let repo = open_repo(cwd)?;
    let status: Status = repo.compute_status()?;
    if json {
        let text = serde_json::to_string_pretty(&status)
            .map_err(|e| Error::invalid_argument(e.to_string()))?;
        println!("{text}");
        return Ok(());
    }

    if let Some(branch) = repo.branches().current_name()? {
        println!("On branch {branch}");
    }
    if status.is_clean() {
        println!("nothing to commit, working tree matches the index");
        return Ok(());
    }
    print_section("new", &status.new);
    print_section("changed", &status.changed);
    print_section("deleted", &status.deleted);
    Ok(())
}

fn cmd_write_tree(cwd: &Path) -> Result<()> {
    let repo = open_repo(cwd)?;
    println!("{}", repo.write_tree()?);
    Ok(())
}

fn cmd_commit(
    cwd: &Path,
    message: &str,
    author_name: Option<String>,
    author_email: Option<String>,
) -> Result<()> {
    let repo = open_repo(cwd)?;
    let author = author_name.map(|name| Signature::now(name, author_email.unwrap_or_default()));
    let id = repo.commit(message, author)?;
    let branch = repo.branches().current_name()?;
    let short = &id.to_hex()[..7];
    match branch {
        Some(branch) => println!("[{branch} {short}] {}", message.lines().next().unwrap_or("")),
        None => println!("[detached HEAD {short}] {}", message.lines().next().unwrap_or("")),
    }
    Ok(())
}

fn cmd_log(cwd: &Path, rev: &str, graph: bool) -> Result<()> {
    let repo = open_repo(cwd)?;
    let history = repo.log(rev)?;
    let mut out = std::io::stdout().lock();
    if graph {
        writeln!(out, "digraph sprig {{")?;
        for (id, commit) in &history {
            for parent in &commit.parents {
                writeln!(out, "  c_{id} -> c_{parent};")?;
            }
        }
        writeln!(out, "}}")?;
        return Ok(());
    }
    for (id, commit) in &history {
        writeln!(out, "commit {id}")?;
        if commit.parents.len() > 1 {
            let short: Vec<String> = commit.parents.iter().map(|p| p.to_hex()[..7].to_string()).collect();
            writeln!(out, "Merge: {}", short.join(" "))?;
        }
        writeln!(out, "Author: {} <{}>", commit.author.name, commit.author.email)?;
        writeln!(out)?;
        for line in commit.message.lines() {
            writeln!(out, "    {line}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn cmd_checkout(cwd: &Path, rev: &str, path: &Path) -> Result<()> {
    let repo = open_repo(cwd)?;
    let written = repo.checkout(rev, path)?;
    println!("Checked out {written} files into {}", path.display());
    Ok(())
}

fn cmd_tag(
    cwd: &Path,
    name: Option<String>,
    object: &str,
    annotate: bool,
    message: Option<String>,
) -> Result<()> {
    let repo = open_repo(cwd)?;
    let name = match name {
        Some(name) => name,
        None => {
            for tag in repo.tags().list()? {
                println!("{tag}");
            }
            return Ok(());
        }
    };
    let message = match (annotate, message) {
        (_, Some(message)) => Some(message),
        (true, None) => Some(String::new()),
        (false, None) => None,
    };
    repo.create_tag(&name, object, message.as_deref(), None)?;
    Ok(())
}

fn cmd_branch(cwd: &Path, name: Option<String>, start: &str, delete: bool) -> Result<()> {
    let repo = open_repo(cwd)?;
    let branches = repo.branches();
    let name = match name {
        Some(name) => name,
        None => {
            let current = branches.current_name()?;
            for branch in branches.list()? {
                let marker = if current.as_deref() == Some(branch.as_str()) { "*" } else { " " };
                println!("{marker} {branch}");
            }
            if let (Some(current), RefTarget::Symbolic(_)) = (&current, repo.head()?) {
                if !branches.has(current)? {
                    println!("* {current} (unborn)");
                }
            }
            return Ok(());
        }
    };

    if delete {
        branches.delete(&name)?;
        return Ok(());
    }
    if branches.has(&name)? {
        return Err(Error::already_exists(format!("branch '{name}'")));
    }
    let id = repo.rev_parse(start, Some(ObjectKind::Commit))?;
    branches.set(&name, id)
}
