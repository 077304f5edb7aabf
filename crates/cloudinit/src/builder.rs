//! cloud-config document builder

use crds::{File, NTP, User};

/// First line of every rendered document unless a header is supplied.
pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config";

/// Content blocks are indented six spaces, under `content: |`.
const CONTENT_PAD: &str = "      ";

/// Input for rendering one node's bootstrap document.
#[derive(Debug, Clone, Default)]
pub struct NodeInput {
    /// First line of the document; `#cloud-config` when unset
    pub header: Option<String>,

    /// Extra files written at first boot
    pub additional_files: Vec<File>,

    /// Commands run after first boot, in order
    pub cloud_init_commands: Vec<String>,

    /// Users created at first boot
    pub users: Vec<User>,

    /// NTP configuration
    pub ntp: Option<NTP>,
}

/// Renders the bootstrap document for a node.
///
/// Sections are emitted in a fixed order: header, write_files, runcmd,
/// ntp, users. The write_files and runcmd keys are always present; the
/// ntp and users sections only when non-empty.
pub fn build_node_document(input: &NodeInput) -> String {
    let mut out = String::new();
    out.push_str(input.header.as_deref().unwrap_or(CLOUD_CONFIG_HEADER));
    out.push('\n');
    render_files(&mut out, &input.additional_files);
    render_commands(&mut out, &input.cloud_init_commands);
    render_ntp(&mut out, input.ntp.as_ref());
    render_users(&mut out, &input.users);
    out
}

fn render_files(out: &mut String, files: &[File]) {
    out.push_str("write_files:\n");
    for file in files {
        out.push_str(&format!("-   path: {}\n", file.path));
        if let Some(encoding) = file.encoding {
            out.push_str(&format!("    encoding: \"{}\"\n", encoding.as_str()));
        }
        if let Some(owner) = &file.owner {
            out.push_str(&format!("    owner: {owner}\n"));
        }
        if let Some(permissions) = &file.permissions {
            out.push_str(&format!("    permissions: '{permissions}'\n"));
        }
        out.push_str("    content: |\n");
        out.push_str(&indent(&file.content, CONTENT_PAD));
        out.push('\n');
    }
}

fn render_commands(out: &mut String, commands: &[String]) {
    out.push_str("runcmd:\n");
    for command in commands {
        out.push_str(&format!("  - {}\n", quote(command)));
    }
}

fn render_ntp(out: &mut String, ntp: Option<&NTP>) {
    let Some(ntp) = ntp else {
        return;
    };
    out.push_str("ntp:\n");
    if let Some(enabled) = ntp.enabled {
        out.push_str(&format!("  enabled: {enabled}\n"));
    }
    if !ntp.servers.is_empty() {
        out.push_str("  servers:\n");
        for server in &ntp.servers {
            out.push_str(&format!("    - {server}\n"));
        }
    }
}

fn render_users(out: &mut String, users: &[User]) {
    if users.is_empty() {
        return;
    }
    out.push_str("users:\n");
    for user in users {
        out.push_str(&format!("  - name: {}\n", user.name));
        if let Some(gecos) = &user.gecos {
            out.push_str(&format!("    gecos: {gecos}\n"));
        }
        if let Some(groups) = &user.groups {
            out.push_str(&format!("    groups: {groups}\n"));
        }
        if let Some(home_dir) = &user.home_dir {
            out.push_str(&format!("    homedir: {home_dir}\n"));
        }
        if let Some(inactive) = user.inactive {
            out.push_str(&format!("    inactive: {inactive}\n"));
        }
        if let Some(lock_password) = user.lock_password {
            out.push_str(&format!("    lock_passwd: {lock_password}\n"));
        }
        if let Some(passwd) = &user.passwd {
            out.push_str(&format!("    passwd: {passwd}\n"));
        }
        if let Some(primary_group) = &user.primary_group {
            out.push_str(&format!("    primary_group: {primary_group}\n"));
        }
        if let Some(shell) = &user.shell {
            out.push_str(&format!("    shell: {shell}\n"));
        }
        if !user.ssh_authorized_keys.is_empty() {
            out.push_str("    ssh_authorized_keys:\n");
            for key in &user.ssh_authorized_keys {
                out.push_str(&format!("      - {key}\n"));
            }
        }
        if let Some(sudo) = &user.sudo {
            out.push_str(&format!("    sudo: {sudo}\n"));
        }
    }
}

/// Prefixes every line of `content` with `pad`, preserving the content
/// itself verbatim (embedded newlines and whitespace included).
fn indent(content: &str, pad: &str) -> String {
    let mut indented = String::with_capacity(content.len() + pad.len());
    indented.push_str(pad);
    indented.push_str(&content.replace('\n', &format!("\n{pad}")));
    indented
}

/// Quotes a command for embedding as a YAML list entry: the string is
/// wrapped in double quotes with embedded backslashes and double quotes
/// backslash-escaped.
fn quote(command: &str) -> String {
    let mut quoted = String::with_capacity(command.len() + 2);
    quoted.push('"');
    for c in command.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
