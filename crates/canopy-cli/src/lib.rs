//! Command-line control surface for canopy trees.
//!
//! Each invocation resolves one tree (a namespace of the configured store,
//! or a repository checkout with `--repo`), runs one operation against it
//! and exits.

pub mod helpers;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use canopy_kernel::{
    CanopyConfig, ProjectResolver, RequestContext, StickyProject, Tree, TreeFactory, check_move,
    tree::index,
};

use helpers::{classify, format_size, format_timestamp, read_input};

#[derive(Parser, Debug)]
#[command(name = "canopy")]
#[command(about = "Inspect and edit multi-tenant file trees")]
pub struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database (overrides [store] path)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Tenant namespace (default namespace when absent)
    #[arg(short, long, global = true)]
    pub namespace: Option<String>,

    /// Open the read-only repository at this path (e.g. repos/site) instead
    #[arg(long, global = true)]
    pub repo: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List a directory
    Ls {
        path: Option<String>,
        /// List every file below PATH
        #[arg(short, long)]
        recursive: bool,
    },
    /// Print a file
    Cat { path: String },
    /// Create or replace a file from FILE, or stdin
    Put { path: String, file: Option<PathBuf> },
    /// Delete a file or directory
    Rm { path: String },
    /// Move a file
    Mv { from: String, to: String },
    /// Delete every file in the namespace
    Clear,
    /// Show file size and modification time
    Stat { path: String },
    /// Show which project a request would resolve to
    Resolve {
        /// Namespace override header value
        #[arg(long)]
        header: Option<String>,
        /// Raw query string, e.g. "_canopy_project=foo&a=b"
        #[arg(long)]
        query: Option<String>,
        /// Request path
        #[arg(long)]
        path: Option<String>,
        /// Request Host header
        #[arg(long)]
        host: Option<String>,
        /// Project remembered from an earlier request (seeds the sticky cache)
        #[arg(long, value_name = "ID")]
        last_project: Option<String>,
        /// Fall back to the remembered project when no source matches
        #[arg(long)]
        sticky: bool,
    },
}

impl Cli {
    /// Load the config file (or defaults) and apply command-line overrides.
    pub fn load_config(&self) -> Result<CanopyConfig> {
        let mut config = match &self.config {
            Some(path) => CanopyConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => CanopyConfig::default(),
        };
        if let Some(db) = &self.db {
            config.store.path = Some(db.clone());
        }
        Ok(config)
    }

    fn open_tree(&self, config: &CanopyConfig) -> Result<Arc<dyn Tree>> {
        let store = config.store.open().context("opening store")?;
        let content_root = match &config.filesystem.content_root {
            Some(root) => root.clone(),
            None => std::env::current_dir().context("resolving content root")?,
        };
        let factory = TreeFactory::new(store)
            .with_policy(config.chunking)
            .with_content_root(content_root);

        match &self.repo {
            Some(repo) => factory.filesystem(repo).map_err(classify),
            None => Ok(factory.tree_for(self.namespace.as_deref())),
        }
    }
}

/// Run one command, writing its output to `out`.
pub async fn run(cli: &Cli, out: &mut impl Write) -> Result<()> {
    let config = cli.load_config()?;

    if let Command::Resolve {
        header,
        query,
        path,
        host,
        last_project,
        sticky,
    } = &cli.command
    {
        let remembered = StickyProject::default();
        if let Some(project) = last_project {
            remembered.set(project);
        }
        let resolver = ProjectResolver::new(config.resolver.clone(), Arc::new(remembered))?;
        let mut ctx = RequestContext::new()
            .with_query_string(query.as_deref().unwrap_or_default())
            .with_path(path.clone().unwrap_or_default());
        if let Some(header) = header {
            ctx = ctx.with_header(&config.resolver.namespace_header, header);
        }
        if let Some(host) = host {
            ctx = ctx.with_host(host);
        }
        match resolver.resolve(&ctx, *sticky) {
            Some(project) => writeln!(out, "{project}")?,
            None => writeln!(out, "(default)")?,
        }
        return Ok(());
    }

    let tree = cli.open_tree(&config)?;
    match &cli.command {
        Command::Resolve { .. } => {}
        Command::Ls { path, recursive } => {
            let entries: Vec<String> = if *recursive {
                let prefix = index::normalize_dir(path.as_deref().unwrap_or_default());
                tree.list_directory(None)
                    .await
                    .map_err(classify)?
                    .into_iter()
                    .filter(|p| p.starts_with(&prefix))
                    .collect()
            } else {
                tree.list_directory(Some(path.as_deref().unwrap_or_default()))
                    .await
                    .map_err(classify)?
            };
            for entry in entries {
                writeln!(out, "{entry}")?;
            }
        }
        Command::Cat { path } => {
            let Some(contents) = tree.get_file_contents(path).await.map_err(classify)? else {
                bail!("not found: {path}");
            };
            out.write_all(&contents)?;
        }
        Command::Put { path, file } => {
            require_mutable(tree.as_ref())?;
            let contents = read_input(file.as_deref()).await?;
            tree.set_file(path, &contents).await.map_err(classify)?;
            tracing::info!(path = %path, size = contents.len(), "stored file");
        }
        Command::Rm { path } => {
            require_mutable(tree.as_ref())?;
            if !tree.delete_path(path).await.map_err(classify)? {
                bail!("not found: {path}");
            }
        }
        Command::Mv { from, to } => {
            require_mutable(tree.as_ref())?;
            check_move(from, to).map_err(classify)?;
            if !tree.move_file(from, to).await.map_err(classify)? {
                bail!("not found: {from}");
            }
        }
        Command::Clear => {
            require_mutable(tree.as_ref())?;
            tree.clear().await.map_err(classify)?;
        }
        Command::Stat { path } => {
            let size = tree.get_file_size(path).await.map_err(classify)?;
            let modified = tree.get_file_last_modified(path).await.map_err(classify)?;
            let (Some(size), Some(modified)) = (size, modified) else {
                bail!("not found: {path}");
            };
            writeln!(out, "path: {path}")?;
            writeln!(out, "size: {} ({size} bytes)", format_size(size))?;
            writeln!(out, "modified: {}", format_timestamp(modified))?;
            writeln!(out, "mutable: {}", tree.is_mutable())?;
        }
    }
    Ok(())
}

fn require_mutable(tree: &dyn Tree) -> Result<()> {
    if !tree.is_mutable() {
        bail!("bad request: tree is read-only");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn exec(args: &[&str]) -> Result<String> {
        let cli = Cli::try_parse_from(std::iter::once("canopy").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        run(&cli, &mut out).await?;
        Ok(String::from_utf8(out)?)
    }

    #[tokio::test]
    async fn test_put_cat_ls_against_sqlite() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("canopy.db");
        let db = db.to_str().unwrap();
        let src = dir.path().join("input.txt");
        std::fs::write(&src, b"hello").unwrap();
        let src = src.to_str().unwrap();

        exec(&["--db", db, "-n", "p1", "put", "a/b.txt", src]).await.unwrap();
        exec(&["--db", db, "-n", "p1", "put", "a/c/d.txt", src]).await.unwrap();

        assert_eq!(exec(&["--db", db, "-n", "p1", "cat", "a/b.txt"]).await.unwrap(), "hello");
        assert_eq!(exec(&["--db", db, "-n", "p1", "ls", "a"]).await.unwrap(), "b.txt\nc\n");
        assert_eq!(
            exec(&["--db", db, "-n", "p1", "ls", "a", "--recursive"]).await.unwrap(),
            "a/b.txt\na/c/d.txt\n"
        );
        // Other namespaces see nothing.
        assert_eq!(exec(&["--db", db, "ls"]).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_mv_and_rm() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("canopy.db");
        let db = db.to_str().unwrap();
        let src = dir.path().join("input.txt");
        std::fs::write(&src, b"x").unwrap();
        let src = src.to_str().unwrap();

        exec(&["--db", db, "put", "old", src]).await.unwrap();
        let err = exec(&["--db", db, "mv", "old", "old"]).await.unwrap_err();
        assert!(err.to_string().contains("bad request"));

        exec(&["--db", db, "mv", "old", "new"]).await.unwrap();
        assert!(exec(&["--db", db, "cat", "old"]).await.is_err());
        exec(&["--db", db, "rm", "new"]).await.unwrap();
        assert!(exec(&["--db", db, "rm", "new"]).await.is_err());
    }

    #[tokio::test]
    async fn test_repo_is_read_only() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("repos/site")).unwrap();
        std::fs::write(dir.path().join("repos/site/index.html"), b"<p>").unwrap();
        let config = dir.path().join("canopy.toml");
        std::fs::write(
            &config,
            format!("[filesystem]\ncontent_root = {:?}\n", dir.path().to_str().unwrap()),
        )
        .unwrap();
        let config = config.to_str().unwrap();

        let listing = exec(&["--config", config, "--repo", "repos/site", "ls"]).await.unwrap();
        assert_eq!(listing, "index.html\n");

        let err = exec(&["--config", config, "--repo", "repos/site", "clear"]).await.unwrap_err();
        assert!(err.to_string().contains("bad request"));

        let err = exec(&["--config", config, "--repo", "other", "ls"]).await.unwrap_err();
        assert!(err.to_string().contains("bad request"));
    }

    #[tokio::test]
    async fn test_resolve() {
        assert_eq!(
            exec(&["resolve", "--query", "_canopy_project=proj42"]).await.unwrap(),
            "proj42\n"
        );
        assert_eq!(
            exec(&["resolve", "--host", "proj2-dot-www.mydomain.com"]).await.unwrap(),
            "proj2\n"
        );
        assert_eq!(exec(&["resolve", "--host", "localhost:8080"]).await.unwrap(), "(default)\n");
        assert_eq!(
            exec(&["resolve", "--header", "hr", "--path", "/_canopy/p/ph/"]).await.unwrap(),
            "hr\n"
        );
    }

    #[tokio::test]
    async fn test_resolve_sticky_fallback() {
        assert_eq!(
            exec(&["resolve", "--last-project", "rt", "--sticky"]).await.unwrap(),
            "rt\n"
        );
        assert_eq!(exec(&["resolve", "--last-project", "rt"]).await.unwrap(), "(default)\n");
        assert_eq!(exec(&["resolve", "--sticky"]).await.unwrap(), "(default)\n");
        // A live source beats the remembered project.
        assert_eq!(
            exec(&["resolve", "--last-project", "rt", "--sticky", "--query", "_canopy_project=q"])
                .await
                .unwrap(),
            "q\n"
        );
    }
}
