use crate::config::Config;
use crate::host::HostMessage;

pub enum PluginEvent {
    /// A key event or settings update arrived from the host.
    Host(HostMessage),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received or the host closed its end; the plugin should exit.
    Shutdown,
}
