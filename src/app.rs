use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use tracing::{info, warn};

use crate::auth::AuthStore;
use crate::batch::{StyleBatch, StyleJob};
use crate::config::AppConfig;
use crate::generation::GeminiClient;
use crate::package::{ZipPackager, sanitize_name, unique_entry_name};
use crate::raster::RasterBuffer;
use crate::session::{EditSession, Upload};
use crate::state::{AdjustmentParams, AspectRatio, CROP_PRESETS, Upscale};
use crate::style::{
    AgeDirective, AgeRange, Enhancements, SkinTone, StyleCategory, StyleVariation, find_variation,
    variations,
};

/// Where the style generator lives and how to authenticate to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSettings {
    pub api_base: String,
    pub model: String,
    pub api_key: Option<String>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct LoginArgs {
    /// Account name in the credential store
    #[arg(long, global = true)]
    pub user: Option<String>,
    #[arg(long = "password", id = "login_password", global = true)]
    pub password: Option<String>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct AdjustArgs {
    /// JSON preset to start from; the flags below override its values
    #[arg(long, value_name = "FILE")]
    pub params: Option<PathBuf>,
    /// Brightness factor, 1.0 leaves it unchanged
    #[arg(long)]
    pub brightness: Option<f32>,
    #[arg(long)]
    pub contrast: Option<f32>,
    #[arg(long)]
    pub saturation: Option<f32>,
    #[arg(long)]
    pub sharpness: Option<f32>,
    /// W:H, a preset name such as "passport", or "none"
    #[arg(long)]
    pub crop: Option<String>,
    /// Clockwise degrees, -180 to 180
    #[arg(long, allow_hyphen_values = true)]
    pub rotate: Option<f32>,
    /// Percent of the current size, 25 to 200
    #[arg(long)]
    pub resize: Option<u32>,
    /// Median-filter passes, 0 to 3
    #[arg(long)]
    pub denoise: Option<u8>,
    /// Resample by 1, 2 or 4 (no detail is recovered)
    #[arg(long)]
    pub upscale: Option<u8>,
}

impl AdjustArgs {
    pub fn resolve(&self) -> Result<AdjustmentParams> {
        let mut params = match &self.params {
            Some(path) => AdjustmentParams::load(path)
                .with_context(|| format!("failed to load preset {}", path.display()))?,
            None => AdjustmentParams::default(),
        };
        if let Some(v) = self.brightness {
            params.brightness = v;
        }
        if let Some(v) = self.contrast {
            params.contrast = v;
        }
        if let Some(v) = self.saturation {
            params.saturation = v;
        }
        if let Some(v) = self.sharpness {
            params.sharpness = v;
        }
        if let Some(crop) = &self.crop {
            params.crop = parse_crop(crop)?;
        }
        if let Some(v) = self.rotate {
            params.rotate = v;
        }
        if let Some(v) = self.resize {
            params.resize_percent = v;
        }
        if let Some(v) = self.denoise {
            params.denoise = v;
        }
        if let Some(v) = self.upscale {
            params.upscale = Upscale::try_from(v)?;
        }
        params.validate()?;
        Ok(params)
    }
}

#[derive(Args, Debug, Default, Clone)]
pub struct OutputArgs {
    /// Directory for individual JPEG files
    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
    /// Bundle the results into one ZIP file
    #[arg(long, value_name = "FILE")]
    pub zip: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    #[arg(required = true)]
    pub photos: Vec<PathBuf>,
    #[command(flatten)]
    pub adjust: AdjustArgs,
    /// Photo the adjustments are committed to
    #[arg(long, default_value_t = 0)]
    pub index: usize,
    /// Render the adjusted photo without committing it
    #[arg(long, conflicts_with = "apply_to_all")]
    pub preview: bool,
    /// Apply the same adjustments to every other photo, each from its original
    #[arg(long)]
    pub apply_to_all: bool,
    /// Put this photo back to its original after adjusting; repeatable
    #[arg(long, value_name = "INDEX", conflicts_with = "preview")]
    pub reset: Vec<usize>,
    /// Write the resolved adjustments as a JSON preset
    #[arg(long, value_name = "FILE")]
    pub save_params: Option<PathBuf>,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug, Default, Clone)]
pub struct EnhanceArgs {
    #[arg(long)]
    pub fill_hair: bool,
    #[arg(long)]
    pub remove_grey_hair: bool,
    #[arg(long)]
    pub smooth_skin: bool,
    #[arg(long, value_enum, default_value_t = SkinTone::Natural)]
    pub skin_tone: SkinTone,
    #[arg(long)]
    pub whiten_teeth: bool,
    #[arg(long)]
    pub brighten_eyes: bool,
    #[arg(long)]
    pub improve_lighting: bool,
    #[arg(long)]
    pub boost_sharpness: bool,
}

impl From<&EnhanceArgs> for Enhancements {
    fn from(args: &EnhanceArgs) -> Self {
        Enhancements {
            fill_hair: args.fill_hair,
            remove_grey_hair: args.remove_grey_hair,
            smooth_skin: args.smooth_skin,
            skin_tone: args.skin_tone,
            whiten_teeth: args.whiten_teeth,
            brighten_eyes: args.brighten_eyes,
            improve_lighting: args.improve_lighting,
            boost_sharpness: args.boost_sharpness,
        }
    }
}

#[derive(Args, Debug)]
pub struct StyleArgs {
    #[arg(required = true)]
    pub photos: Vec<PathBuf>,
    #[arg(long, value_enum)]
    pub category: StyleCategory,
    /// Variation name, repeatable; defaults to the whole category
    #[arg(long = "variation", value_name = "NAME")]
    pub variations: Vec<String>,
    /// Adjustment preset applied to every photo before styling
    #[arg(long, value_name = "FILE")]
    pub params: Option<PathBuf>,
    #[command(flatten)]
    pub enhance: EnhanceArgs,
    /// Ask the model to keep the person's apparent age
    #[arg(long, conflicts_with = "target_age")]
    pub preserve_age: bool,
    /// Known age to state when preserving; skips estimation
    #[arg(long, requires = "preserve_age")]
    pub age: Option<u32>,
    /// Apparent age to aim for: N or MIN-MAX
    #[arg(long, value_name = "AGE")]
    pub target_age: Option<String>,
    /// Scene to place the person in
    #[arg(long, value_name = "FILE")]
    pub background: Option<PathBuf>,
    /// Photo whose look should be matched
    #[arg(long, value_name = "FILE")]
    pub reference: Option<PathBuf>,
    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create an account, permanent unless --expiry-hours is given
    Add {
        username: String,
        password: String,
        #[arg(long)]
        expiry_hours: Option<u32>,
    },
    /// Create a time-limited trial account
    Trial {
        username: String,
        password: String,
        /// Defaults to trial_hours from the config
        #[arg(long)]
        hours: Option<u32>,
    },
    /// Push an account's expiry further out
    Extend { username: String, hours: u32 },
    /// Change a password
    Passwd {
        username: String,
        old_password: String,
        new_password: String,
    },
    /// Show expiry status
    Info { username: String },
    /// Check a username and password
    Verify { username: String, password: String },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration
    Show,
    /// Write the effective configuration to the config file
    Init,
}

/// Accepts `none`, a preset name (case-insensitive prefix of the label),
/// or `W:H`.
pub fn parse_crop(value: &str) -> Result<Option<AspectRatio>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("none") || value.eq_ignore_ascii_case("original") {
        return Ok(None);
    }
    if let Some((_, ratio)) = CROP_PRESETS.iter().find(|(label, _)| {
        label
            .split_whitespace()
            .next()
            .is_some_and(|name| name.eq_ignore_ascii_case(value))
    }) {
        return Ok(Some(*ratio));
    }
    Ok(Some(value.parse::<AspectRatio>()?))
}

pub fn parse_target_age(value: &str) -> Result<AgeRange> {
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .with_context(|| format!("invalid age {v:?}"))
    };
    let (min, max) = match value.split_once('-') {
        Some((lo, hi)) => (parse(lo)?, parse(hi)?),
        None => {
            let age = parse(value)?;
            (age, age)
        }
    };
    if min > max {
        bail!("age range {min}-{max} is reversed");
    }
    Ok(AgeRange { min, max })
}

fn age_directive(args: &StyleArgs) -> Result<Option<AgeDirective>> {
    if args.preserve_age {
        return Ok(Some(AgeDirective::Preserve { detected: args.age }));
    }
    args.target_age
        .as_deref()
        .map(|v| parse_target_age(v).map(AgeDirective::Target))
        .transpose()
}

pub fn resolve_variations(category: StyleCategory, names: &[String]) -> Result<Vec<StyleVariation>> {
    if names.is_empty() {
        return Ok(variations(category).copied().collect());
    }
    names
        .iter()
        .map(|name| {
            find_variation(category, name).copied().with_context(|| {
                let known: Vec<_> = variations(category).map(|v| v.name).collect();
                format!(
                    "no {category} variation named {name:?}; choose from: {}",
                    known.join(", ")
                )
            })
        })
        .collect()
}

fn label_for(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string())
}

fn read_uploads(paths: &[PathBuf]) -> Vec<Upload> {
    paths
        .iter()
        .filter_map(|path| match fs::read(path) {
            Ok(bytes) => Some(Upload {
                label: label_for(path),
                bytes,
            }),
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping unreadable file");
                eprintln!("skipped {}: {err}", path.display());
                None
            }
        })
        .collect()
}

fn load_session(paths: &[PathBuf]) -> Result<EditSession> {
    let (session, failures) = EditSession::load(read_uploads(paths));
    for failure in &failures {
        eprintln!("skipped {}: {}", failure.label, failure.error);
    }
    if session.is_empty() {
        bail!("none of the {} photos could be loaded", paths.len());
    }
    Ok(session)
}

fn ensure_index(session: &EditSession, index: usize) -> Result<()> {
    if index >= session.len() {
        bail!(
            "photo index {index} is out of range; {} photos loaded",
            session.len()
        );
    }
    Ok(())
}

fn read_image(path: &Path) -> Result<RasterBuffer> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let image = RasterBuffer::decode(&bytes)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    Ok(image.normalized())
}

/// Writes JPEGs to the output directory and/or a ZIP. With neither flag
/// set, files go to `default_dir`.
fn write_outputs(
    items: &[(String, &RasterBuffer)],
    output: &OutputArgs,
    quality: u8,
    default_dir: &str,
) -> Result<()> {
    let out_dir = match (&output.out_dir, &output.zip) {
        (None, None) => Some(PathBuf::from(default_dir)),
        (dir, _) => dir.clone(),
    };

    if let Some(dir) = out_dir {
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let mut used = HashSet::new();
        for (name, buffer) in items {
            let file = dir.join(unique_entry_name(&sanitize_name(name), &mut used));
            let jpeg = buffer.encode_jpeg(quality)?;
            fs::write(&file, jpeg).with_context(|| format!("failed to write {}", file.display()))?;
        }
        println!("Wrote {} photos to {}", items.len(), dir.display());
    }

    if let Some(zip) = &output.zip {
        let bytes = ZipPackager::new(quality)
            .pack(items.iter().map(|(name, buffer)| (name.as_str(), *buffer)))
            .context("failed to build archive")?;
        fs::write(zip, bytes).with_context(|| format!("failed to write {}", zip.display()))?;
        println!("Wrote {} photos to {}", items.len(), zip.display());
    }
    Ok(())
}

/// Checks `--user/--password` unless the config turns login off.
pub fn login(config: &AppConfig, login: &LoginArgs) -> Result<()> {
    if !config.require_login {
        return Ok(());
    }
    let (Some(user), Some(password)) = (&login.user, &login.password) else {
        bail!("login required: pass --user and --password");
    };
    let store = AuthStore::open(config.credentials_path())?;
    store.verify(user, password)?;
    if let Some(account) = store.account_info(user) {
        if account.expiring_soon {
            eprintln!(
                "Your account expires in {}.",
                account.time_remaining()
            );
        }
    }
    info!(user = %user, "logged in");
    Ok(())
}

pub fn edit(config: &AppConfig, args: EditArgs) -> Result<()> {
    let params = args.adjust.resolve()?;
    if let Some(path) = &args.save_params {
        params
            .save(path)
            .with_context(|| format!("failed to save preset {}", path.display()))?;
        println!("Saved adjustments to {}", path.display());
    }

    let mut session = load_session(&args.photos)?;
    ensure_index(&session, args.index)?;
    for &index in &args.reset {
        ensure_index(&session, index)?;
    }

    if args.preview {
        let label = session.photo(args.index).label().to_string();
        let preview = session.preview(args.index, &params)?;
        let name = format!("{label}-preview");
        return write_outputs(&[(name, preview)], &args.output, config.jpeg_quality, "edited");
    }

    session.commit(args.index, &params)?;
    if args.apply_to_all {
        let updated = session.apply_to_all(&params, Some(args.index))?;
        println!("Applied adjustments to {} more photos", updated);
    }
    for &index in &args.reset {
        session.reset_to_original(index);
    }

    let items: Vec<(String, &RasterBuffer)> = session
        .photos()
        .iter()
        .map(|photo| (photo.label().to_string(), photo.working()))
        .collect();
    write_outputs(&items, &args.output, config.jpeg_quality, "edited")
}

pub fn style(config: &AppConfig, remote: &RemoteSettings, args: StyleArgs) -> Result<()> {
    let variations = resolve_variations(args.category, &args.variations)?;
    let age = age_directive(&args)?;
    let mut session = load_session(&args.photos)?;
    if let Some(path) = &args.params {
        let params = AdjustmentParams::load(path)
            .with_context(|| format!("failed to load preset {}", path.display()))?;
        session.apply_to_all(&params, None)?;
    }

    let job = StyleJob {
        variations,
        enhancements: Enhancements::from(&args.enhance),
        age,
        background: args.background.as_deref().map(read_image).transpose()?,
        reference: args.reference.as_deref().map(read_image).transpose()?,
        directives: config.prompt,
    };

    let client = GeminiClient::new(remote.api_key.clone(), &remote.api_base, &remote.model)?;
    let mut batch = StyleBatch::new(&client);
    if matches!(job.age, Some(AgeDirective::Preserve { detected: None })) {
        batch = batch.with_estimator(&client);
    }
    let outcomes = batch.run(session.photos(), &job, |p| {
        println!("[{}/{}] {}: {}", p.current, p.total, p.label, p.variation);
    });

    for outcome in &outcomes {
        if let Some(warning) = &outcome.warning {
            eprintln!("{} ({}): {}", outcome.label, outcome.variation, warning);
        }
    }
    let generated = outcomes.iter().filter(|o| o.generated).count();
    println!("Generated {generated} of {} variations", outcomes.len());

    let items: Vec<(String, &RasterBuffer)> = outcomes
        .iter()
        .map(|o| (o.export_name(), &o.image))
        .collect();
    write_outputs(&items, &args.output, config.jpeg_quality, "styled")
}

pub fn list_styles() {
    for category in StyleCategory::ALL {
        println!("{category}");
        for variation in variations(category) {
            println!("  {}", variation.name);
        }
    }
}

pub fn user(config: &AppConfig, command: UserCommand) -> Result<()> {
    let mut store = AuthStore::open(config.credentials_path())?;
    match command {
        UserCommand::Add {
            username,
            password,
            expiry_hours,
        } => match store.add_user(&username, &password, expiry_hours)? {
            Some(expiry) => println!(
                "User created successfully. Account expires: {}",
                expiry.format("%Y-%m-%d %H:%M:%S")
            ),
            None => println!("User created successfully (permanent account)"),
        },
        UserCommand::Trial {
            username,
            password,
            hours,
        } => {
            let expiry =
                store.add_trial_user(&username, &password, hours.unwrap_or(config.trial_hours))?;
            println!(
                "Trial account created. Account expires: {}",
                expiry.format("%Y-%m-%d %H:%M:%S")
            );
        }
        UserCommand::Extend { username, hours } => {
            let until = store.extend_account(&username, hours)?;
            println!("Account extended until {}", until.format("%Y-%m-%d %H:%M:%S"));
        }
        UserCommand::Passwd {
            username,
            old_password,
            new_password,
        } => {
            store.change_password(&username, &old_password, &new_password)?;
            println!("Password changed successfully");
        }
        UserCommand::Info { username } => {
            let account = store
                .account_info(&username)
                .with_context(|| format!("no user named {username:?}"))?;
            println!("User:      {}", account.username);
            println!("Expires:   {}", account.expiry_display());
            println!("Remaining: {}", account.time_remaining());
            if account.expiring_soon {
                println!("Status:    expiring soon");
            } else if account.is_expired {
                println!("Status:    expired");
            } else {
                println!("Status:    active");
            }
        }
        UserCommand::Verify { username, password } => {
            store.verify(&username, &password)?;
            println!("Success");
        }
    }
    Ok(())
}

pub fn config(config: &AppConfig, explicit_path: Option<&Path>, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            if let Some(path) = explicit_path
                .map(Path::to_path_buf)
                .or_else(AppConfig::config_path)
            {
                println!("# {}", path.display());
            }
            print!("{}", config.to_toml()?);
        }
        ConfigCommand::Init => {
            let path = match explicit_path {
                Some(path) => {
                    config.save_to(path)?;
                    path.to_path_buf()
                }
                None => config.save()?,
            };
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}
