mod common;

use std::fs;
use anyhow::Result;
use ngs_qc_pipelines::config::defs::{
    PipelineError, BOWTIE2_BUILD_TAG, BOWTIE_BUILD_TAG, BOXPLOTTER_TAG, FASTQC_TAG, FASTQ_SCREENS, FASTQ_SCREEN_TAG,
    SOLID2FASTQ_TAG, SOLID_FILTER_STATS, SOLID_PREPROCESS_FILTER_TAG,
};
use ngs_qc_pipelines::pipelines::{build_indexes, fastq_screen, illumina_qc, solid_qc};
use ngs_qc_pipelines::utils::command::Toolbox;
use ngs_qc_pipelines::utils::stats::FILTER_STATS_HEADER;
use common::{base_args, run_config, write_script};

const LAST_ARG: &str = "if [ \"$1\" = \"--version\" ]; then echo \"version 2.4.1\"; exit 0; fi\nfor a; do last=$a; done";

const FASTQC_STUB: &str = r#"
if [ "$1" = "--version" ]; then echo "FastQC v0.11.9"; exit 0; fi
for a; do last=$a; done
base=$(basename "$last"); base=${base%.gz}; base=${base%.fastq}
touch "$2/${base}_fastqc.zip" "$2/${base}_fastqc.html"
"#;

const FASTQ_SCREEN_STUB: &str = r#"
if [ "$1" = "--version" ]; then echo "FastQ Screen v0.4.2"; exit 0; fi
outdir=.
while [ $# -gt 1 ]; do
  if [ "$1" = "--outdir" ]; then outdir=$2; fi
  shift
done
base=$(basename "$1"); base=${base%.gz}; base=${base%.fastq}
echo hits > "$outdir/${base}_screen.txt"
touch "$outdir/${base}_screen.png"
"#;


#[tokio::test]
async fn test_illumina_qc_with_screens() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let fastq = dir.path().join("PB_R1.fastq.gz");
    fs::write(&fastq, "")?;
    let conf_dir = dir.path().join("conf");
    fs::create_dir_all(&conf_dir)?;
    for screen in FASTQ_SCREENS {
        fs::write(conf_dir.join(format!("fastq_screen_{}.conf", screen)), "")?;
    }
    let toolbox = Toolbox::new()
        .with_program(FASTQC_TAG, write_script(dir.path(), "fastqc", FASTQC_STUB)?)
        .with_program(FASTQ_SCREEN_TAG, write_script(dir.path(), "fastq_screen", FASTQ_SCREEN_STUB)?);

    let mut args = base_args("illumina_qc");
    args.file1 = Some("PB_R1.fastq.gz".to_string());
    args.screen_conf_dir = Some(conf_dir.display().to_string());
    illumina_qc::run_with_toolbox(run_config(dir.path(), args), &toolbox).await?;

    let qc = dir.path().join("qc");
    assert!(qc.join("PB_R1_fastqc.zip").exists());
    assert!(qc.join("PB_R1_fastqc.html").exists());
    for screen in FASTQ_SCREENS {
        assert_eq!(fs::read_to_string(qc.join(format!("PB_R1_{}_screen.txt", screen)))?.trim(), "hits");
        assert!(qc.join(format!("PB_R1_{}_screen.png", screen)).exists());
    }
    let leftovers = fs::read_dir(&qc)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("tmp."))
        .count();
    assert_eq!(leftovers, 0);
    Ok(())
}


#[tokio::test]
async fn test_illumina_qc_failed_fastqc_fails_module() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("s.fastq"), "")?;
    let toolbox = Toolbox::new().with_program(FASTQC_TAG, write_script(dir.path(), "fastqc", "exit 2")?);

    let mut args = base_args("illumina_qc");
    args.file1 = Some("s.fastq".to_string());
    let result = illumina_qc::run_with_toolbox(run_config(dir.path(), args), &toolbox).await;
    assert!(matches!(result, Err(PipelineError::StepsFailed(1))));
    Ok(())
}


#[tokio::test]
async fn test_fastq_screen_module_skips_done_screens() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("s.fastq"), "")?;
    let conf_dir = dir.path().join("conf");
    fs::create_dir_all(&conf_dir)?;
    for screen in FASTQ_SCREENS {
        fs::write(conf_dir.join(format!("fastq_screen_{}_color.conf", screen)), "")?;
    }
    let calls = dir.path().join("calls");
    let stub = format!("echo call >> '{}'\n{}", calls.display(), FASTQ_SCREEN_STUB);
    let toolbox = Toolbox::new().with_program(FASTQ_SCREEN_TAG, write_script(dir.path(), "fastq_screen", &stub)?);

    let mut args = base_args("fastq_screen");
    args.file1 = Some("s.fastq".to_string());
    args.out_dir = Some("screens".to_string());
    args.colour_space = true;
    args.screen_conf_dir = Some(conf_dir.display().to_string());

    fastq_screen::run_with_toolbox(run_config(dir.path(), args.clone()), &toolbox).await?;
    let first = fs::read_to_string(&calls)?.lines().count();
    assert!(dir.path().join("screens").join("s_rRNA_screen.txt").exists());

    fastq_screen::run_with_toolbox(run_config(dir.path(), args.clone()), &toolbox).await?;
    // only the version check runs the second time
    assert_eq!(fs::read_to_string(&calls)?.lines().count(), first + 1);

    args.screen_conf_dir = None;
    let result = fastq_screen::run_with_toolbox(run_config(dir.path(), args), &toolbox).await;
    assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    Ok(())
}


#[tokio::test]
async fn test_solid_qc_end_to_end() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("S1_F3.csfasta"), "# title\n>1_1_F3\nT0123\n>1_2_F3\nT0123\n>1_3_F3\nT0123\n")?;
    fs::write(dir.path().join("S1_F3_QV.qual"), "# title\n>1_1_F3\n20 20 20 20\n")?;

    let solid2fastq = write_script(dir.path(), "solid2fastq", "echo '@r' > \"$2.fastq\"")?;
    let filter = write_script(dir.path(), "filter", r#"
while [ $# -gt 1 ]; do
  case "$1" in
    -o) prefix=$2 ;;
    -f) cs=$2 ;;
    -g) qual=$2 ;;
  esac
  shift 2
done
grep -v '^#' "$cs" | head -n 4 > "${prefix}_T_F3.csfasta"
cp "$qual" "${prefix}_QV_T_F3.qual"
"#)?;
    let boxplotter = write_script(dir.path(), "qc_boxplotter", "touch \"$(basename \"$1\")_seq-order_boxplot.pdf\"")?;
    let toolbox = Toolbox::new()
        .with_program(SOLID2FASTQ_TAG, solid2fastq)
        .with_program(SOLID_PREPROCESS_FILTER_TAG, filter)
        .with_program(BOXPLOTTER_TAG, boxplotter);

    let mut args = base_args("solid_qc");
    args.file1 = Some("S1_F3.csfasta".to_string());
    args.file2 = Some("S1_F3_QV.qual".to_string());
    solid_qc::run_with_toolbox(run_config(dir.path(), args), &toolbox).await?;

    assert!(dir.path().join("S1_F3.fastq").exists());
    assert!(dir.path().join("S1_F3_T_F3.csfasta").exists());
    assert!(dir.path().join("S1_F3_QV_T_F3.qual").exists());
    assert!(dir.path().join("S1_F3_T_F3.fastq").exists());
    assert!(dir.path().join("qc").join("S1_F3_QV.qual_seq-order_boxplot.pdf").exists());

    let stats = fs::read_to_string(dir.path().join(SOLID_FILTER_STATS))?;
    let lines: Vec<&str> = stats.lines().collect();
    assert_eq!(lines, vec![FILTER_STATS_HEADER, "S1_F3.csfasta\t3\t2\t1\t33.33"]);
    assert!(!dir.path().join(format!("{}.lock", SOLID_FILTER_STATS)).exists());
    Ok(())
}


#[tokio::test]
async fn test_solid_qc_continues_after_failed_step() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("S2.csfasta"), ">1\nT0\n")?;
    fs::write(dir.path().join("S2_QV.qual"), ">1\n20\n")?;
    let toolbox = Toolbox::new()
        .with_program(SOLID2FASTQ_TAG, write_script(dir.path(), "solid2fastq", "exit 1")?)
        .with_program(SOLID_PREPROCESS_FILTER_TAG, write_script(dir.path(), "filter", "exit 1")?)
        .with_program(BOXPLOTTER_TAG, write_script(dir.path(), "qc_boxplotter", "touch \"$(basename \"$1\")_boxplot.png\"")?);

    let mut args = base_args("solid_qc");
    args.file1 = Some("S2.csfasta".to_string());
    args.file2 = Some("S2_QV.qual".to_string());
    let result = solid_qc::run_with_toolbox(run_config(dir.path(), args), &toolbox).await;

    assert!(matches!(result, Err(PipelineError::StepsFailed(2))));
    assert!(dir.path().join("qc").join("S2_QV.qual_boxplot.png").exists());
    assert!(!dir.path().join(SOLID_FILTER_STATS).exists());
    Ok(())
}


#[tokio::test]
async fn test_build_indexes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("phiX.fasta"), ">phiX\nACGT\n")?;
    let bowtie = write_script(
        dir.path(),
        "bowtie-build",
        &format!("{}\nfor s in 1 2 3 4 rev.1 rev.2; do touch \"$last.$s.ebwt\"; done", LAST_ARG),
    )?;
    let bowtie2 = write_script(
        dir.path(),
        "bowtie2-build",
        &format!("{}\nfor s in 1 2 3 4 rev.1 rev.2; do touch \"$last.$s.bt2\"; done", LAST_ARG),
    )?;
    let toolbox = Toolbox::new()
        .with_program(BOWTIE_BUILD_TAG, bowtie)
        .with_program(BOWTIE2_BUILD_TAG, bowtie2);

    let mut args = base_args("build_indexes");
    args.file1 = Some("phiX.fasta".to_string());
    args.out_dir = Some("indexes".to_string());
    build_indexes::run_with_toolbox(run_config(dir.path(), args), &toolbox).await?;

    let out = dir.path().join("indexes");
    for s in [".1.ebwt", ".rev.2.ebwt"] {
        assert!(out.join("bowtie").join(format!("phiX{}", s)).exists());
        assert!(out.join("bowtie").join(format!("phiX_c{}", s)).exists());
    }
    assert!(out.join("bowtie2").join("phiX.4.bt2").exists());
    let leftovers = fs::read_dir(&out)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("tmp."))
        .count();
    assert_eq!(leftovers, 0);
    Ok(())
}


#[tokio::test]
async fn test_build_indexes_incomplete_index_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("ref.fa"), ">r\nA\n")?;
    let bowtie = write_script(dir.path(), "bowtie-build", &format!("{}\ntouch \"$last.1.ebwt\"", LAST_ARG))?;
    let toolbox = Toolbox::new()
        .with_program(BOWTIE_BUILD_TAG, bowtie)
        .with_program(BOWTIE2_BUILD_TAG, dir.path().join("missing-bowtie2-build"));

    let mut args = base_args("build_indexes");
    args.file1 = Some("ref.fa".to_string());
    let result = build_indexes::run_with_toolbox(run_config(dir.path(), args), &toolbox).await;
    assert!(matches!(result, Err(PipelineError::StepsFailed(2))));
    assert!(!dir.path().join("bowtie").join("ref.1.ebwt").exists());
    Ok(())
}
