use std::path::PathBuf;

use crate::Cli;
use crate::error::ExtractError;
use crate::filter::Selection;
use crate::registry::ImageRef;
use crate::registry::auth::Credentials;

/// Where the selected layer ends up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// The compressed blob, unmodified, written to a file
    Raw(PathBuf),
    /// A tar archive of the selected entries on stdout
    Filtered(Selection),
}

/// Validated settings for one run, built once from the command line.
#[derive(Debug, Clone)]
pub struct Config {
    pub image: ImageRef,
    pub layer: i64,
    pub mode: OutputMode,
    pub registry_url: String,
    pub credentials: Credentials,
    pub quiet: bool,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self, ExtractError> {
        let image = cli
            .image
            .as_deref()
            .ok_or_else(|| ExtractError::Usage("missing image reference".to_string()))?;
        let image = ImageRef::parse(image)?;

        // `--output=` is the same as no output file.
        let output = cli.output.clone().filter(|p| !p.as_os_str().is_empty());

        let mode = match output {
            Some(_) if !cli.files.is_empty() => {
                return Err(ExtractError::Usage(
                    "Cannot specify an output file when only some files are extracted".to_string(),
                ));
            }
            Some(path) => OutputMode::Raw(path),
            None => OutputMode::Filtered(Selection::from_files(&cli.files)),
        };

        if cli.username.is_some() != cli.password.is_some() {
            return Err(ExtractError::Usage(
                "--username and --password must be given together".to_string(),
            ));
        }

        Ok(Self {
            image,
            layer: cli.layer,
            mode,
            registry_url: cli.registry.clone(),
            credentials: Credentials::new(cli.username.clone(), cli.password.clone()),
            quiet: cli.quiet,
        })
    }
}
