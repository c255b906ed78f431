pub mod exists;
pub mod get;
pub mod init;
pub mod ls;
pub mod put;
pub mod rm;
pub mod stat;
pub mod url;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Write the configuration file
    Init(init::InitArgs),
    /// Upload a file
    Put(put::PutArgs),
    /// Download a file
    Get(get::GetArgs),
    /// Delete a file
    Rm(rm::RmArgs),
    /// Check whether a file exists
    Exists(exists::ExistsArgs),
    /// List names under a path
    Ls(ls::LsArgs),
    /// Show size and modification time of a file
    Stat(stat::StatArgs),
    /// Print the public URL of a file
    Url(url::UrlArgs),
}
